//! Running operations over many subjects.
//!
//! Subjects are processed in blocks of `nthread`: every subject of a block
//! gets its own blocking worker and the whole block finishes before the next
//! one starts.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::fsl::Fsl;
use crate::outcome::Outcome;
use crate::subject::{Subject, Template};
use crate::transforms::{SubjectTransforms, TransformOptions};

pub type OperationFn = fn(&SubjectTransforms, &TransformOptions) -> Outcome;

#[derive(Clone, Copy, Debug)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    pub run: OperationFn,
}

#[derive(Clone, Debug, Default)]
pub struct OperationRegistry {
    operations: Vec<Operation>,
    index: HashMap<&'static str, usize>,
}

fn dti_t2_direct(transforms: &SubjectTransforms, options: &TransformOptions) -> Outcome {
    let options = TransformOptions {
        ignore_t2: true,
        ..options.clone()
    };
    transforms.transform_dti_t2(&options)
}

impl OperationRegistry {
    /// The producer methods of [`SubjectTransforms`].
    pub fn transforms() -> Self {
        [
            Operation {
                name: "transform_mpr",
                description: "structural to standard",
                run: SubjectTransforms::transform_mpr,
            },
            Operation {
                name: "transform_rs",
                description: "resting state to structural and standard",
                run: SubjectTransforms::transform_rs,
            },
            Operation {
                name: "transform_fmri",
                description: "task fmri to structural and standard",
                run: SubjectTransforms::transform_fmri,
            },
            Operation {
                name: "transform_dti_t2",
                description: "diffusion to structural and standard, through t2 when present",
                run: SubjectTransforms::transform_dti_t2,
            },
            Operation {
                name: "transform_dti_t2_direct",
                description: "diffusion to structural and standard, ignoring t2",
                run: dti_t2_direct,
            },
            Operation {
                name: "transform_extra",
                description: "resting state to task fmri",
                run: SubjectTransforms::transform_extra,
            },
        ]
        .into()
    }

    pub fn add(&mut self, operation: Operation) {
        if self.index.contains_key(operation.name) {
            panic!("Operation {} already exists", operation.name);
        }
        self.index.insert(operation.name, self.operations.len());
        self.operations.push(operation);
    }

    pub fn by_name(&self, name: &str) -> Option<&Operation> {
        self.index.get(name).map(|&idx| &self.operations[idx])
    }

    /// Looks up every name, failing on the first unknown one.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Operation>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.by_name(name)
                    .copied()
                    .ok_or_else(|| Error::UnknownOperation(name.to_string()))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<It> From<It> for OperationRegistry
where
    It: IntoIterator<Item = Operation>,
{
    fn from(iter: It) -> Self {
        let mut registry = OperationRegistry::default();
        for operation in iter {
            registry.add(operation);
        }
        registry
    }
}

#[derive(Debug)]
pub struct OperationOutcome {
    pub operation: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct SubjectReport {
    pub label: String,
    pub outcomes: Vec<OperationOutcome>,
}

impl SubjectReport {
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.is_failed())
    }
}

/// Subject reports in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub subjects: Vec<SubjectReport>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.subjects
            .iter()
            .flat_map(|subject| subject.outcomes.iter())
            .filter(|o| pred(&o.outcome))
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count(Outcome::is_completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failed)
    }

    pub fn failed_subjects(&self) -> Vec<&str> {
        self.subjects
            .iter()
            .filter(|subject| subject.failed())
            .map(|subject| subject.label.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} subjects: {} completed, {} skipped, {} failed",
            self.subjects.len(),
            self.completed(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Runs `operations` in order; a failure ends the subject.
fn run_subject(
    transforms: &SubjectTransforms,
    operations: &[Operation],
    options: &TransformOptions,
) -> SubjectReport {
    let label = transforms.subject().label.clone();
    let mut outcomes = Vec::with_capacity(operations.len());

    for operation in operations {
        let outcome = (operation.run)(transforms, options);
        let failed = outcome.is_failed();
        if failed {
            error!("{}: {} failed, remaining operations dropped", label, operation.name);
        }
        outcomes.push(OperationOutcome {
            operation: operation.name,
            outcome,
        });
        if failed {
            break;
        }
    }

    SubjectReport { label, outcomes }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub dir: PathBuf,
    pub subjects_dir: PathBuf,
    pub roi_dir: PathBuf,
    pub template: Template,
    pub std4_analysis: bool,
    fsl: Fsl,
    registry: OperationRegistry,
}

impl Project {
    /// Subjects live in `<dir>/subjects/<label>`, project ROIs in `<dir>/roi`.
    pub fn new(dir: impl Into<PathBuf>, template: Template, fsl: Fsl) -> Self {
        let dir = dir.into();
        Project {
            subjects_dir: dir.join("subjects"),
            roi_dir: dir.join("roi"),
            dir,
            template,
            std4_analysis: false,
            fsl,
            registry: OperationRegistry::transforms(),
        }
    }

    pub fn with_std4_analysis(mut self, std4_analysis: bool) -> Self {
        self.std4_analysis = std4_analysis;
        self
    }

    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn fsl(&self) -> &Fsl {
        &self.fsl
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn subject(&self, label: &str) -> Subject {
        Subject::new(
            label,
            self.subjects_dir.join(label),
            &self.roi_dir,
            self.template.clone(),
        )
        .with_std4_analysis(self.std4_analysis)
    }

    pub fn transforms(&self, label: &str) -> SubjectTransforms {
        SubjectTransforms::new(self.subject(label), self.fsl.clone())
    }

    pub fn subject_dir(&self, label: &str) -> PathBuf {
        self.subjects_dir.join(label)
    }

    pub fn roi_dir(&self) -> &Path {
        &self.roi_dir
    }

    /// Runs the named operations on every subject, `nthread` subjects at a
    /// time. Unknown operation names are rejected before any work starts.
    pub async fn run_subjects_methods<L: AsRef<str>, O: AsRef<str>>(
        &self,
        labels: &[L],
        operations: &[O],
        options: &TransformOptions,
        nthread: usize,
    ) -> Result<BatchReport> {
        let operations = self.registry.resolve(operations)?;
        if nthread == 0 {
            return Err(Error::InvalidConfig("nthread must be at least 1".to_string()));
        }

        let blocks = labels.chunks(nthread);
        let nblocks = blocks.len();
        let mut report = BatchReport::default();

        for (idx, block) in blocks.enumerate() {
            let handles: Vec<_> = block
                .iter()
                .map(|label| {
                    let label = label.as_ref().to_string();
                    let transforms = self.transforms(&label);
                    let operations = operations.clone();
                    let options = options.clone();
                    let handle = tokio::task::spawn_blocking(move || {
                        run_subject(&transforms, &operations, &options)
                    });
                    (label, handle)
                })
                .collect();

            for (label, handle) in handles {
                let subject_report = match handle.await {
                    Ok(subject_report) => subject_report,
                    Err(err) => {
                        error!("{}: worker failed, {}", label, err);
                        SubjectReport {
                            outcomes: vec![OperationOutcome {
                                operation: "worker",
                                outcome: Outcome::Failed(Error::WorkerPanicked {
                                    label: label.clone(),
                                    message: err.to_string(),
                                }),
                            }],
                            label,
                        }
                    }
                };
                report.subjects.push(subject_report);
            }

            info!("block {}/{} finished ({} subjects)", idx + 1, nblocks, block.len());
        }

        if report.failed() > 0 {
            warn!("{}", report.summary());
        } else {
            info!("{}", report.summary());
        }

        Ok(report)
    }
}
