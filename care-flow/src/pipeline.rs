use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one stage of the fixed analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    Symptom,
    Literature,
    Case,
    Treatment,
    Summary,
}

/// Static description of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStep {
    pub id: StepId,
    pub name: &'static str,
    pub description: &'static str,
}

/// The pipeline, in execution order.
pub const PIPELINE: [PipelineStep; 5] = [
    PipelineStep {
        id: StepId::Symptom,
        name: "Symptom Analysis",
        description: "Analyzing patient symptoms",
    },
    PipelineStep {
        id: StepId::Literature,
        name: "Literature Review",
        description: "Searching medical literature",
    },
    PipelineStep {
        id: StepId::Case,
        name: "Case Matching",
        description: "Finding similar cases",
    },
    PipelineStep {
        id: StepId::Treatment,
        name: "Treatment Suggestions",
        description: "Generating treatment options",
    },
    PipelineStep {
        id: StepId::Summary,
        name: "Final Summary",
        description: "Creating comprehensive report",
    },
];

impl StepId {
    pub const ALL: [StepId; 5] = [
        StepId::Symptom,
        StepId::Literature,
        StepId::Case,
        StepId::Treatment,
        StepId::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Symptom => "symptom",
            StepId::Literature => "literature",
            StepId::Case => "case",
            StepId::Treatment => "treatment",
            StepId::Summary => "summary",
        }
    }

    /// Key under which the analysis backend reports this step, and under which the
    /// report backend expects it.
    pub fn backend_key(&self) -> &'static str {
        match self {
            StepId::Symptom => "symptom_analysis",
            StepId::Literature => "literature",
            StepId::Case => "case_matcher",
            StepId::Treatment => "treatment",
            StepId::Summary => "summary",
        }
    }

    pub fn from_backend_key(key: &str) -> Option<StepId> {
        StepId::ALL.into_iter().find(|step| step.backend_key() == key)
    }

    /// Heading used when presenting the step's results
    pub fn result_title(&self) -> &'static str {
        match self {
            StepId::Symptom => "Symptom Analysis Results",
            StepId::Literature => "Literature Review",
            StepId::Case => "Case Matching Results",
            StepId::Treatment => "Treatment Suggestions",
            StepId::Summary => "Final Summary",
        }
    }

    pub fn step(&self) -> &'static PipelineStep {
        &PIPELINE[self.position()]
    }

    /// Zero-based position in [`PIPELINE`].
    pub fn position(&self) -> usize {
        match self {
            StepId::Symptom => 0,
            StepId::Literature => 1,
            StepId::Case => 2,
            StepId::Treatment => 3,
            StepId::Summary => 4,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
