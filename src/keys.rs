//! Storage key names.
//!
//! Each stage accumulated several record names over successive product
//! iterations. Alias lists are ordered oldest-precedence first and must stay in
//! this order: the migrator walks every alias for a stage in sequence and the
//! invalidator removes all of them.

use crate::types::Step;

/// The unified pipeline record.
pub const PIPELINE_KEY: &str = "brandPipeline_v1";

/// Newest-first list of report snapshots.
pub const HISTORY_KEY: &str = "brandReportHistory_v1";

/// Records written by the diagnosis interview. The migrator reads them in
/// order; a full reset removes all of them.
pub const DIAGNOSIS_DRAFT_KEYS: &[&str] = &[
    "diagnosisInterviewDraft_v1",
    "diagnosisInterviewDraft",
    "brandDiagnosisDraft",
];

/// Diagnosis outputs that are not drafts but still belong to the diagnosis
/// phase and are discarded on a full reset.
pub const DIAGNOSIS_RESULT_KEYS: &[&str] = &["diagnosisResult_v1", "diagnosisSummary_v1"];

const NAMING_KEYS: &[&str] = &[
    "namingConsultingInterviewDraft_v1",
    "namingInterviewDraft_v1",
    "brandNamingResult",
];

const CONCEPT_KEYS: &[&str] = &[
    "conceptConsultingInterviewDraft_v1",
    "homepageConsultingInterviewDraft_v1",
    "conceptInterviewDraft_v1",
    "homepageInterviewDraft_v1",
    "brandConceptResult",
];

const STORY_KEYS: &[&str] = &[
    "storyConsultingInterviewDraft_v1",
    "brandStoryConsultingInterviewDraft_v1",
    "storyInterviewDraft_v1",
    "brandStoryResult",
];

const LOGO_KEYS: &[&str] = &[
    "logoConsultingInterviewDraft_v1",
    "logoInterviewDraft_v1",
    "brandLogoResult",
];

/// Every legacy record name that may hold `step`'s result, in resolution order.
pub fn legacy_keys(step: Step) -> &'static [&'static str] {
    match step {
        Step::Naming => NAMING_KEYS,
        Step::Concept => CONCEPT_KEYS,
        Step::Story => STORY_KEYS,
        Step::Logo => LOGO_KEYS,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn legacy_keys_are_unique_across_stages() {
        let mut seen = HashSet::new();
        for step in Step::ALL {
            for key in legacy_keys(step) {
                assert!(seen.insert(*key), "duplicate legacy key {}", key);
            }
        }
        for key in DIAGNOSIS_DRAFT_KEYS.iter().chain(DIAGNOSIS_RESULT_KEYS) {
            assert!(seen.insert(*key), "diagnosis key {} collides", key);
        }
        assert!(!seen.contains(PIPELINE_KEY));
        assert!(!seen.contains(HISTORY_KEY));
    }
}
