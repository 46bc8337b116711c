//! 按关键词对任务目标分类，planner 和长期记忆共用同一张关键词表

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Research,
    Development,
    Analysis,
    Writing,
    General,
}

const RESEARCH_KEYWORDS: &[&str] = &[
    "research",
    "find",
    "information",
    "learn about",
    "study",
    "discover",
    "研究",
    "调研",
    "查找",
];
const DEVELOPMENT_KEYWORDS: &[&str] = &[
    "develop",
    "code",
    "program",
    "create",
    "build",
    "implement",
    "开发",
    "实现",
];
const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "evaluate", "assess", "review", "分析", "评估"];
const WRITING_KEYWORDS: &[&str] = &["write", "draft", "compose", "撰写", "写"];

impl TaskCategory {
    /// 依次匹配 research → development → analysis → writing，都不命中时为 General
    pub fn classify(description: &str) -> Self {
        let text = description.to_lowercase();
        let hit = |keywords: &[&str]| keywords.iter().any(|kw| text.contains(kw));
        if hit(RESEARCH_KEYWORDS) {
            TaskCategory::Research
        } else if hit(DEVELOPMENT_KEYWORDS) {
            TaskCategory::Development
        } else if hit(ANALYSIS_KEYWORDS) {
            TaskCategory::Analysis
        } else if hit(WRITING_KEYWORDS) {
            TaskCategory::Writing
        } else {
            TaskCategory::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Research => "research",
            TaskCategory::Development => "development",
            TaskCategory::Analysis => "analysis",
            TaskCategory::Writing => "writing",
            TaskCategory::General => "general",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            TaskCategory::classify("Research the history of Rust"),
            TaskCategory::Research
        );
        assert_eq!(
            TaskCategory::classify("Build a CLI tool"),
            TaskCategory::Development
        );
        assert_eq!(
            TaskCategory::classify("Review quarterly numbers"),
            TaskCategory::Analysis
        );
        assert_eq!(TaskCategory::classify("Draft the memo"), TaskCategory::Writing);
        assert_eq!(TaskCategory::classify("Water the plants"), TaskCategory::General);
    }

    #[test]
    fn test_research_wins_over_writing() {
        // 同时命中多类时按表顺序取第一类
        assert_eq!(
            TaskCategory::classify("find sources and write a summary"),
            TaskCategory::Research
        );
    }
}
