use serde::{Deserialize, Serialize};

use crate::error::ItemError;

/// Raw detection emitted by a backend, before confidence filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionCandidate {
    /// x1, y1, x2, y2 in original image pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

impl DetectionCandidate {
    pub fn area(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn iou(&self, other: &DetectionCandidate) -> f32 {
        let x1 = self.bbox[0].max(other.bbox[0]);
        let y1 = self.bbox[1].max(other.bbox[1]);
        let x2 = self.bbox[2].min(other.bbox[2]);
        let y2 = self.bbox[3].min(other.bbox[3]);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A candidate that survived the confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredDetection {
    pub confidence: f32,
    #[serde(rename = "class")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    /// Sanitised client filename, display only and not unique
    pub filename: String,
    pub detections: Vec<FilteredDetection>,
    #[serde(rename = "has_bunny")]
    pub has_subject: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageResult {
    pub fn from_outcome(
        filename: impl Into<String>,
        outcome: Result<Vec<FilteredDetection>, ItemError>,
    ) -> Self {
        let filename = filename.into();
        match outcome {
            Ok(detections) => Self {
                filename,
                has_subject: !detections.is_empty(),
                detections,
                error: None,
            },
            Err(e) => Self {
                filename,
                detections: Vec::new(),
                has_subject: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub success: bool,
    pub results: Vec<ImageResult>,
    pub total_processed: usize,
    #[serde(rename = "bunnies_found")]
    pub subjects_found: usize,
}

impl BatchReport {
    pub fn from_results(results: Vec<ImageResult>) -> Self {
        let subjects_found = results.iter().filter(|r| r.has_subject).count();
        Self {
            success: true,
            total_processed: results.len(),
            subjects_found,
            results,
        }
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleReport {
    pub success: bool,
    #[serde(rename = "has_bunny")]
    pub has_subject: bool,
    pub detections: Vec<FilteredDetection>,
}

impl SingleReport {
    pub fn from_detections(detections: Vec<FilteredDetection>) -> Self {
        Self {
            success: true,
            has_subject: !detections.is_empty(),
            detections,
        }
    }
}
