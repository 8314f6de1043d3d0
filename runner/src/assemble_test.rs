use crate::{
    assemble::{build_full_runs, AssembleError, Run},
    matching::{MatchError, Role},
};
use std::{fs, path::Path, path::PathBuf};
use tempfile::tempdir;

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

#[test]
fn one_run_per_case_with_shared_template() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    for case in ["case1", "case2", "case3"] {
        touch(&root, &format!("runs/{case}/structure.lmp"));
    }
    touch(&root, "templates/control");

    let runs = build_full_runs(
        &root.join("runs"),
        &[Role::new("structure", "structure.lmp")],
        &root.join("templates"),
        &[Role::new("control", "control")],
        &["control", "structure"],
    )
    .unwrap();

    assert_eq!(runs.len(), 3);
    for (run, case) in runs.iter().zip(["case1", "case2", "case3"]) {
        assert_eq!(run.task_dir, root.join("runs").join(case));
        assert_eq!(run.labels().collect::<Vec<_>>(), vec!["control", "structure"]);
        assert_eq!(run.get("control").unwrap(), root.join("templates/control"));
        assert_eq!(
            run.get("structure").unwrap(),
            root.join("runs").join(case).join("structure.lmp")
        );
    }
}

#[test]
fn nested_templates_are_recreated_below_the_case() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    touch(&root, "runs/case1/ffield");
    touch(&root, "runs/case2/ffield");
    touch(&root, "inputs/in.matensemble");
    touch(&root, "inputs/md/nvt/control");

    let runs = build_full_runs(
        &root.join("runs"),
        &[Role::new("ffield", "ffield")],
        &root.join("inputs"),
        &[
            Role::new("in_lammps", "in.matensemble"),
            Role::new("control", "control"),
        ],
        &["ffield", "in_lammps", "control"],
    )
    .unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].task_dir, root.join("runs/case1/md/nvt"));
    assert_eq!(runs[1].task_dir, root.join("runs/case2/md/nvt"));
}

#[test]
fn many_to_many_runs_form_a_product() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    touch(&root, "runs/a/structure.lmp");
    touch(&root, "runs/b/structure.lmp");
    touch(&root, "inputs/nvt/control");
    touch(&root, "inputs/npt/control");

    let runs = build_full_runs(
        &root.join("runs"),
        &[Role::new("structure", "structure.lmp")],
        &root.join("inputs"),
        &[Role::new("control", "control")],
        &["structure", "control"],
    )
    .unwrap();

    let task_dirs = runs.iter().map(|run| run.task_dir.clone()).collect::<Vec<_>>();
    assert_eq!(
        task_dirs,
        vec![
            root.join("runs/a/npt"),
            root.join("runs/a/nvt"),
            root.join("runs/b/npt"),
            root.join("runs/b/nvt"),
        ]
    );
}

#[test]
fn missing_template_role_is_reported() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    touch(&root, "runs/a/structure.lmp");
    fs::create_dir_all(root.join("inputs")).unwrap();

    let result = build_full_runs(
        &root.join("runs"),
        &[Role::new("structure", "structure.lmp")],
        &root.join("inputs"),
        &[Role::new("control", "control")],
        &["structure", "control"],
    );

    match result {
        Err(AssembleError::Match(MatchError::MissingRole { root: missing, label, .. })) => {
            assert_eq!(missing, root.join("inputs"));
            assert_eq!(label, "control");
        }
        other => panic!("expected a missing role, got {other:?}"),
    }
}

#[test]
fn reorder_follows_requested_labels() {
    let run = Run {
        args: vec![
            ("b".into(), PathBuf::from("/p1")),
            ("c".into(), PathBuf::from("/p2")),
            ("a".into(), PathBuf::from("/p3")),
        ],
        task_dir: PathBuf::from("/run"),
    };

    let reordered = run.clone().reorder(&["a", "b", "c"]).unwrap();
    assert_eq!(
        reordered.paths().collect::<Vec<_>>(),
        vec![Path::new("/p3"), Path::new("/p1"), Path::new("/p2")]
    );

    assert!(matches!(
        run.reorder(&["a", "d"]),
        Err(AssembleError::UnknownLabel(label)) if label == "d"
    ));
}

#[test]
fn duplicate_labels_are_rejected() {
    let dir = tempdir().unwrap();

    let result = build_full_runs(
        dir.path(),
        &[Role::new("control", "control")],
        dir.path(),
        &[Role::new("control", "control.in")],
        &["control"],
    );

    assert!(matches!(result, Err(AssembleError::DuplicateLabel(_))));
}
