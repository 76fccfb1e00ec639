use crate::command::Tool;
use crate::dispatch::{Operation, OperationRegistry};
use crate::error::Error;
use crate::outcome::Outcome;
use crate::space::Space;
use crate::tests::fake_fsl::Fixture;
use crate::tests::log_capture;
use crate::transforms::{SubjectTransforms, TransformOptions};

fn explode(_: &SubjectTransforms, _: &TransformOptions) -> Outcome {
    panic!("worker exploded");
}

#[test]
fn transform_registry_lists_every_producer() {
    let registry = OperationRegistry::transforms();
    let names: Vec<&str> = registry.iter().map(|op| op.name).collect();
    assert_eq!(
        names,
        [
            "transform_mpr",
            "transform_rs",
            "transform_fmri",
            "transform_dti_t2",
            "transform_dti_t2_direct",
            "transform_extra",
        ]
    );
    assert!(registry.by_name("transform_roi").is_none());
    assert!(matches!(
        registry.resolve(&["transform_mpr", "transform_all"]),
        Err(Error::UnknownOperation(name)) if name == "transform_all"
    ));
}

#[test]
#[should_panic(expected = "Operation transform_mpr already exists")]
fn duplicate_operations_panic() {
    let mut registry = OperationRegistry::transforms();
    registry.add(Operation {
        name: "transform_mpr",
        description: "again",
        run: SubjectTransforms::transform_mpr,
    });
}

#[tokio::test]
async fn batch_runs_subjects_in_blocks() -> anyhow::Result<()> {
    log_capture::start();
    let fixture = Fixture::new()?;
    fixture.subject("s01", &[Space::Hr, Space::Rs])?;
    fixture.subject("s02", &[Space::Hr])?;
    fixture.subject("s03", &[Space::Rs])?;

    let report = fixture
        .project
        .run_subjects_methods(
            &["s01", "s02", "s03"],
            &["transform_mpr", "transform_rs"],
            &TransformOptions::default(),
            2,
        )
        .await?;

    let labels: Vec<&str> = report.subjects.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, ["s01", "s02", "s03"]);
    assert_eq!(report.completed(), 3);
    assert_eq!(report.skipped(), 3);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.summary(), "3 subjects: 3 completed, 3 skipped, 0 failed");

    let messages: Vec<String> = log_capture::take().into_iter().map(|(_, m)| m).collect();
    assert!(messages.iter().any(|m| m == "block 1/2 finished (2 subjects)"));
    assert!(messages.iter().any(|m| m == "block 2/2 finished (1 subjects)"));
    assert!(messages.iter().any(|m| m == &report.summary()));

    assert!(report.subjects[1].outcomes[1].outcome.is_skipped());
    assert!(fixture
        .project
        .transforms("s01")
        .warp(Space::Std, Space::Rs)
        .exist());
    Ok(())
}

#[tokio::test]
async fn failure_stops_the_subject_only() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.subject("s01", &[Space::Hr, Space::Rs])?;
    fixture.subject("s02", &[Space::Hr, Space::Rs])?;
    fixture.fake.fail_on(Tool::Fnirt);

    let report = fixture
        .project
        .run_subjects_methods(
            &["s01", "s02"],
            &["transform_mpr", "transform_rs"],
            &TransformOptions::default(),
            1,
        )
        .await?;

    assert_eq!(report.failed(), 2);
    assert_eq!(report.failed_subjects(), ["s01", "s02"]);
    for subject in &report.subjects {
        assert_eq!(subject.outcomes.len(), 1);
        assert_eq!(subject.outcomes[0].operation, "transform_mpr");
        assert!(matches!(
            subject.outcomes[0].outcome.error(),
            Some(Error::ToolFailed { .. })
        ));
    }
    Ok(())
}

#[tokio::test]
async fn unknown_operations_are_rejected_before_work() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.subject("s01", &[Space::Hr])?;

    let result = fixture
        .project
        .run_subjects_methods(
            &["s01"],
            &["transform_mpr", "transform_everything"],
            &TransformOptions::default(),
            4,
        )
        .await;

    assert!(matches!(result, Err(Error::UnknownOperation(_))));
    assert_eq!(fixture.fake.call_count(), 0);

    let zero = fixture
        .project
        .run_subjects_methods(&["s01"], &["transform_mpr"], &TransformOptions::default(), 0)
        .await;
    assert!(matches!(zero, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn worker_panic_becomes_failed_subject() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let mut registry = OperationRegistry::transforms();
    registry.add(Operation {
        name: "explode",
        description: "panics",
        run: explode,
    });
    let project = fixture.project.clone().with_registry(registry);

    let report = project
        .run_subjects_methods(&["s01", "s02"], &["explode"], &TransformOptions::default(), 2)
        .await?;

    assert_eq!(report.subjects.len(), 2);
    assert_eq!(report.failed_subjects(), ["s01", "s02"]);
    assert!(matches!(
        report.subjects[0].outcomes[0].outcome.error(),
        Some(Error::WorkerPanicked { label, .. }) if label == "s01"
    ));
    Ok(())
}

#[tokio::test]
async fn direct_dti_operation_ignores_t2() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let transforms = fixture.subject("s01", &[Space::Hr, Space::Dti, Space::T2])?;

    let report = fixture
        .project
        .run_subjects_methods(
            &["s01"],
            &["transform_mpr", "transform_dti_t2_direct"],
            &TransformOptions::default(),
            1,
        )
        .await?;

    assert_eq!(report.completed(), 2);
    assert!(!transforms.mat(Space::T2, Space::Hr).exists());
    assert!(transforms.mat(Space::Dti, Space::Std).is_file());
    Ok(())
}
