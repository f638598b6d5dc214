use std::collections::HashMap;

use super::detection::{ClassPrediction, Detection};

/// Per-class running maximum of confidence across the sampled frames of a clip.
///
/// Labels keep the order in which they were first seen so the final list is
/// stable between runs over the same input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaxConfidence {
    entries: Vec<ClassPrediction>,
}

impl MaxConfidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame's detections in. A stored maximum is only replaced by a
    /// strictly greater score.
    pub fn fold(&mut self, detections: &[Detection]) {
        for det in detections {
            match self.entries.iter_mut().find(|e| e.class_id == det.label) {
                Some(entry) => {
                    if det.score > entry.confidence {
                        entry.confidence = det.score;
                    }
                }
                None => self.entries.push(ClassPrediction::from(det)),
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|e| e.class_id == label)
            .map(|e| e.confidence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Vec<ClassPrediction> {
        self.entries
    }
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for det in detections {
        *counts.entry(det.label.as_str()).or_insert(0) += 1;
    }
    let mut parts: Vec<_> = counts
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect();
    parts.sort();
    parts.join(", ")
}
