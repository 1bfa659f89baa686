use anyhow::Result;

use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};

pub const JOB_NAME: &str = "delete-pages";

pub const DEFAULT_REASON: &str = "Bot: delete pages scheduled for cleanup";

/// Deletes every listed page. The worklist always comes from the caller:
/// explicit titles or the members of a category.
#[derive(Debug, Clone)]
pub struct DeletePages {
    reason: String,
}

impl DeletePages {
    pub fn new(reason: Option<&str>) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_REASON);
        Self {
            reason: reason.to_string(),
        }
    }
}

impl Transform for DeletePages {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary(&self.reason, run_tag)
    }

    fn apply(&self, _input: &TransformInput<'_>) -> Result<TransformOutcome> {
        Ok(TransformOutcome::Delete(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::run_applied;
    use crate::store::testing::MockStore;
    use crate::worklist::Worklist;

    #[test]
    fn deletes_existing_pages_and_skips_missing_ones() {
        let job = DeletePages::new(Some("Bot: remove duplicate Q pages"));
        let mut store = MockStore::with_pages(&[("Q100", "dup"), ("Q101", "dup")]);
        let mut worklist = Worklist::from_titles(vec![
            "Q100".to_string(),
            "Q102".to_string(),
            "Q101".to_string(),
        ]);

        let report = run_applied(&mut store, &mut worklist, &job, Some("cleanup-7"));

        assert_eq!(store.deletes, vec!["Q100", "Q101"]);
        assert_eq!(
            store.delete_reasons,
            vec![
                "Bot: remove duplicate Q pages (run tag: cleanup-7)",
                "Bot: remove duplicate Q pages (run tag: cleanup-7)"
            ]
        );
        assert_eq!(report.deleted, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn blank_reason_falls_back_to_default() {
        assert_eq!(DeletePages::new(Some("  ")).summary(None), DEFAULT_REASON);
        assert_eq!(DeletePages::new(None).summary(None), DEFAULT_REASON);
    }
}
