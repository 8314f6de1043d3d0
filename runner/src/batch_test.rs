use crate::{
    assemble::Run,
    batch::{ancestor, batch_by_parent, render_list},
};
use std::path::{Path, PathBuf};

fn run(task_dir: &str) -> Run {
    Run {
        args: vec![
            ("ffield".into(), PathBuf::from("/inputs/ffield")),
            ("structure".into(), Path::new(task_dir).join("structure.lmp")),
        ],
        task_dir: PathBuf::from(task_dir),
    }
}

#[test]
fn depth_zero_is_identity() {
    let runs = vec![run("/r/a/1"), run("/r/a/1"), run("/r/b/1")];
    let batches = batch_by_parent(&runs, 0);

    assert_eq!(batches.len(), 3);
    for (batch, run) in batches.iter().zip(runs.iter()) {
        assert_eq!(batch.task_dir, run.task_dir);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.first("structure"), run.get("structure"));
    }
}

#[test]
fn runs_sharing_an_ancestor_are_merged() {
    let runs = vec![
        run("/r/a/1"),
        run("/r/b/1"),
        run("/r/a/2"),
        run("/r/a/3"),
    ];
    let batches = batch_by_parent(&runs, 1);

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].task_dir, PathBuf::from("/r/a"));
    assert_eq!(batches[1].task_dir, PathBuf::from("/r/b"));

    let structures = batches[0].get("structure").unwrap();
    assert_eq!(structures.len(), 3);
    assert_eq!(batches[0].get("ffield").unwrap().len(), 3);
    assert_eq!(
        structures,
        [
            PathBuf::from("/r/a/1/structure.lmp"),
            PathBuf::from("/r/a/2/structure.lmp"),
            PathBuf::from("/r/a/3/structure.lmp"),
        ]
    );
    assert_eq!(batches[1].len(), 1);
}

#[test]
fn deeper_levels_merge_more() {
    let runs = vec![run("/r/a/1"), run("/r/b/1"), run("/r/a/2")];
    let batches = batch_by_parent(&runs, 2);

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].task_dir, PathBuf::from("/r"));
    assert_eq!(
        batches[0].members,
        vec![
            PathBuf::from("/r/a/1"),
            PathBuf::from("/r/b/1"),
            PathBuf::from("/r/a/2")
        ]
    );
}

#[test]
fn ancestor_stops_at_root() {
    assert_eq!(ancestor(Path::new("/a/b"), 1), PathBuf::from("/a"));
    assert_eq!(ancestor(Path::new("/a/b"), 5), PathBuf::from("/"));
    assert_eq!(ancestor(Path::new("/a/b"), 0), PathBuf::from("/a/b"));
}

#[test]
fn rendered_lists_are_literals() {
    assert_eq!(render_list(&["/a/x", "/b/y"]), "['/a/x', '/b/y']");
    assert_eq!(render_list(&["/it's"]), r"['/it\'s']");
    assert_eq!(render_list::<&str>(&[]), "[]");

    let batches = batch_by_parent(&[run("/r/a/1"), run("/r/a/2")], 1);
    assert_eq!(
        batches[0].render_args(),
        vec![
            "['/inputs/ffield', '/inputs/ffield']".to_owned(),
            "['/r/a/1/structure.lmp', '/r/a/2/structure.lmp']".to_owned(),
        ]
    );
}
