//! Subjects and their on-disk layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::space::Space;

/// Brain, whole-head and dilated-mask images of one template resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateImages {
    pub brain: Image,
    pub head: Image,
    pub mask_dil: Image,
}

impl TemplateImages {
    /// `<dir>/<prefix>_brain`, `<dir>/<prefix>`, `<dir>/<prefix>_brain_mask_dil`.
    pub fn from_prefix(dir: &Path, prefix: &str) -> Self {
        TemplateImages {
            brain: Image::new(dir.join(format!("{}_brain", prefix))),
            head: Image::new(dir.join(prefix)),
            mask_dil: Image::new(dir.join(format!("{}_brain_mask_dil", prefix))),
        }
    }

    pub fn all(&self) -> [&Image; 3] {
        [&self.brain, &self.head, &self.mask_dil]
    }

    fn first_missing(&self) -> Option<&Image> {
        self.all().into_iter().find(|image| !image.exist())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub std: TemplateImages,
    pub std4: TemplateImages,
}

impl Template {
    pub fn from_prefix(dir: &Path, std_prefix: &str, std4_prefix: &str) -> Self {
        Template {
            std: TemplateImages::from_prefix(dir, std_prefix),
            std4: TemplateImages::from_prefix(dir, std4_prefix),
        }
    }

    /// MNI152 T1 templates at 2mm and 4mm.
    pub fn mni152(dir: &Path) -> Self {
        Self::from_prefix(dir, "MNI152_T1_2mm", "MNI152_T1_4mm")
    }

    pub fn images(&self, space: Space) -> Option<&TemplateImages> {
        match space {
            Space::Std => Some(&self.std),
            Space::Std4 => Some(&self.std4),
            _ => None,
        }
    }

    pub fn has_std4(&self) -> bool {
        self.std4.first_missing().is_none()
    }
}

/// Result of checking a subject's templates before running a producer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateCheck {
    pub error: Option<String>,
    pub process_std4: bool,
}

/// One subject of a project.
///
/// Layout under `dir`:
/// `mpr/<label>-t1[_brain]`, `resting/reg/example_func`,
/// `fmri/reg/example_func`, `dti/<label>-dti_nodiff[_brain]`,
/// `t2/<label>-t2[_brain]`, `roi/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub label: String,
    pub dir: PathBuf,
    /// Project-wide ROIs defined in the standard spaces.
    pub project_roi_dir: PathBuf,
    pub template: Template,
    pub std4_analysis: bool,

    pub t1_data: Image,
    pub t1_brain_data: Image,
    pub rs_examplefunc: Image,
    pub fmri_examplefunc: Image,
    pub dti_nodiff_data: Image,
    pub dti_nodiff_brain_data: Image,
    pub t2_data: Image,
    pub t2_brain_data: Image,
    pub roi_dir: PathBuf,
}

impl Subject {
    pub fn new(
        label: impl Into<String>,
        dir: impl Into<PathBuf>,
        project_roi_dir: impl Into<PathBuf>,
        template: Template,
    ) -> Self {
        let label = label.into();
        let dir = dir.into();

        let mpr = dir.join("mpr");
        let dti = dir.join("dti");
        let t2 = dir.join("t2");

        Subject {
            t1_data: Image::new(mpr.join(format!("{}-t1", label))),
            t1_brain_data: Image::new(mpr.join(format!("{}-t1_brain", label))),
            rs_examplefunc: Image::new(dir.join("resting").join("reg").join("example_func")),
            fmri_examplefunc: Image::new(dir.join("fmri").join("reg").join("example_func")),
            dti_nodiff_data: Image::new(dti.join(format!("{}-dti_nodiff", label))),
            dti_nodiff_brain_data: Image::new(dti.join(format!("{}-dti_nodiff_brain", label))),
            t2_data: Image::new(t2.join(format!("{}-t2", label))),
            t2_brain_data: Image::new(t2.join(format!("{}-t2_brain", label))),
            roi_dir: dir.join("roi"),
            project_roi_dir: project_roi_dir.into(),
            template,
            std4_analysis: false,
            label,
            dir,
        }
    }

    pub fn with_std4_analysis(mut self, std4_analysis: bool) -> Self {
        self.std4_analysis = std4_analysis;
        self
    }

    /// Modality folder of a space. Template spaces have none of their own and
    /// map to the structural folder.
    pub fn space_dir(&self, space: Space) -> PathBuf {
        match space {
            Space::Hr | Space::Std | Space::Std4 => self.dir.join("mpr"),
            Space::Rs => self.dir.join("resting"),
            Space::Fmri => self.dir.join("fmri"),
            Space::Dti => self.dir.join("dti"),
            Space::T2 => self.dir.join("t2"),
        }
    }

    pub fn reg_dir(&self, space: Space) -> PathBuf {
        self.space_dir(space).join("reg")
    }

    /// Reference image of a space.
    pub fn anchor(&self, space: Space) -> &Image {
        match space {
            Space::Hr => &self.t1_brain_data,
            Space::Rs => &self.rs_examplefunc,
            Space::Fmri => &self.fmri_examplefunc,
            Space::Dti => &self.dti_nodiff_brain_data,
            Space::T2 => &self.t2_brain_data,
            Space::Std => &self.template.std.brain,
            Space::Std4 => &self.template.std4.brain,
        }
    }

    pub fn has_t1(&self) -> bool {
        self.t1_data.exist() && self.t1_brain_data.exist()
    }

    pub fn has_rs(&self) -> bool {
        self.rs_examplefunc.exist()
    }

    pub fn has_fmri(&self) -> bool {
        self.fmri_examplefunc.exist()
    }

    pub fn has_dti(&self) -> bool {
        self.dti_nodiff_data.exist() && self.dti_nodiff_brain_data.exist()
    }

    pub fn has_t2(&self) -> bool {
        self.t2_data.exist() && self.t2_brain_data.exist()
    }

    /// Whether images of `space` can take part in registrations.
    pub fn has_space(&self, space: Space) -> bool {
        match space {
            Space::Hr => self.has_t1(),
            Space::Rs => self.has_rs(),
            Space::Fmri => self.has_fmri(),
            Space::Dti => self.has_dti(),
            Space::T2 => self.has_t2(),
            Space::Std => true,
            Space::Std4 => {
                let check = self.check_template();
                check.error.is_none() && check.process_std4
            }
        }
    }

    /// The 2mm template is always required; the 4mm one only when the
    /// subject is analysed at 4mm, which needs resting-state data.
    pub fn check_template(&self) -> TemplateCheck {
        if let Some(missing) = self.template.std.first_missing() {
            return TemplateCheck {
                error: Some(format!("standard template {} is missing", missing)),
                process_std4: false,
            };
        }

        let process_std4 = self.std4_analysis && self.has_rs();
        if process_std4 {
            if let Some(missing) = self.template.std4.first_missing() {
                return TemplateCheck {
                    error: Some(format!("4mm standard template {} is missing", missing)),
                    process_std4,
                };
            }
        }

        TemplateCheck {
            error: None,
            process_std4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(image: &Image) -> std::io::Result<()> {
        std::fs::create_dir_all(image.dir())?;
        std::fs::write(image.cpath(), b"")
    }

    #[test]
    fn layout_follows_label() {
        let subject = Subject::new(
            "s01",
            "/proj/subjects/s01",
            "/proj/roi",
            Template::mni152(Path::new("/fsl/data/standard")),
        );

        assert_eq!(
            subject.t1_brain_data.cpath(),
            PathBuf::from("/proj/subjects/s01/mpr/s01-t1_brain.nii.gz")
        );
        assert_eq!(
            subject.rs_examplefunc.fpathnoext(),
            Path::new("/proj/subjects/s01/resting/reg/example_func")
        );
        assert_eq!(subject.reg_dir(Space::Dti), PathBuf::from("/proj/subjects/s01/dti/reg"));
        assert_eq!(
            subject.anchor(Space::Std4).name(),
            "MNI152_T1_4mm_brain"
        );
        assert_eq!(
            subject.template.std.mask_dil.name(),
            "MNI152_T1_2mm_brain_mask_dil"
        );
    }

    #[test]
    fn template_check_gates_std4_on_resting_state() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let template = Template::mni152(&root.path().join("standard"));
        let subject = Subject::new("s01", root.path().join("s01"), root.path().join("roi"), template)
            .with_std4_analysis(true);

        let check = subject.check_template();
        assert!(check.error.is_some());

        for image in subject.template.std.all() {
            touch(image)?;
        }
        assert_eq!(subject.check_template(), TemplateCheck::default());

        touch(&subject.rs_examplefunc)?;
        let check = subject.check_template();
        assert!(check.process_std4);
        assert!(check.error.as_deref().is_some_and(|e| e.contains("4mm")));
        assert!(!subject.has_space(Space::Std4));

        for image in subject.template.std4.all() {
            touch(image)?;
        }
        let check = subject.check_template();
        assert!(check.process_std4);
        assert_eq!(check.error, None);
        assert!(subject.has_space(Space::Std4));

        Ok(())
    }

    #[test]
    fn modality_flags() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let subject = Subject::new(
            "s02",
            root.path(),
            root.path().join("roi"),
            Template::mni152(root.path()),
        );

        assert!(!subject.has_t1() && !subject.has_t2() && !subject.has_dti());
        assert!(subject.has_space(Space::Std));

        touch(&subject.t2_data)?;
        assert!(!subject.has_t2());
        touch(&subject.t2_brain_data)?;
        assert!(subject.has_t2());
        assert!(subject.has_space(Space::T2));

        Ok(())
    }
}
