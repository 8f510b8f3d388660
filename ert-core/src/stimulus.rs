use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One face stimulus: image file, analysis name, parallel-port code.
/// The three always travel together through randomization so the code
/// emitted and the name logged match the image on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceStimulus {
    pub path: PathBuf,
    pub name: String,
    pub code: u8,
}

/// Ordered set of face stimuli for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusSet {
    faces: Vec<FaceStimulus>,
}

impl StimulusSet {
    /// Builds the set from image paths, assigning names CSplus-1.. and
    /// 1-based port codes in list order.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let faces = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| FaceStimulus {
                path,
                name: format!("CSplus-{}", i + 1),
                code: (i + 1) as u8,
            })
            .collect();
        Self { faces }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn faces(&self) -> &[FaceStimulus] {
        &self.faces
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaceStimulus> {
        self.faces.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_names_follow_list_order() {
        let set = StimulusSet::from_paths(vec!["a.jpg".into(), "b.jpg".into()]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.faces()[0].name, "CSplus-1");
        assert_eq!(set.faces()[0].code, 1);
        assert_eq!(set.faces()[1].name, "CSplus-2");
        assert_eq!(set.faces()[1].code, 2);
    }
}
