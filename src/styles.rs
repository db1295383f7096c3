use serde::{Deserialize, Serialize};

/// Table-of-contents pattern chosen when a book is planned. Each pattern has
/// a fixed default writing style; the mapping is configuration, not logic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TocPattern {
    PracticalGuide,
    StepByStep,
    ProblemSolution,
    CaseStudy,
    QuestionAnswer,
    StoryDriven,
}

pub fn default_style(pattern: TocPattern) -> &'static str {
    match pattern {
        TocPattern::PracticalGuide => "plain instructional prose",
        TocPattern::StepByStep => "numbered walkthrough",
        TocPattern::ProblemSolution => "problem-first analysis",
        TocPattern::CaseStudy => "narrative case study",
        TocPattern::QuestionAnswer => "conversational question and answer",
        TocPattern::StoryDriven => "story-driven narrative",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_maps_to_a_style() {
        let patterns = [
            TocPattern::PracticalGuide,
            TocPattern::StepByStep,
            TocPattern::ProblemSolution,
            TocPattern::CaseStudy,
            TocPattern::QuestionAnswer,
            TocPattern::StoryDriven,
        ];
        for pattern in patterns {
            assert!(!default_style(pattern).is_empty());
        }
        assert_eq!(default_style(TocPattern::StepByStep), "numbered walkthrough");
    }
}
