use super::Planner;
use crate::error::Result;
use crate::memory::Insight;
use crate::tasks::TaskCategory;
use async_trait::async_trait;
use tracing::debug;

/// 计划里最多带入的历史经验条数
const MAX_INSIGHT_STEPS: usize = 3;

/// 按目标中的关键词附加的步骤
const EXTRA_STEPS: &[(&[&str], &[&str])] = &[
    (&["report", "summary"], &["Compile the findings into a report"]),
    (
        &["presentation"],
        &[
            "Prepare presentation slides",
            "Write speaking notes for the presentation",
        ],
    ),
    (
        &["budget", "cost"],
        &[
            "Build a budget breakdown",
            "List cost-saving options and contingencies",
        ],
    ),
    (
        &["team", "collaborate"],
        &[
            "Assign roles to team members",
            "Agree on how the team communicates",
        ],
    ),
];

/// 不依赖外部模型的关键词规划器
///
/// 先按 [`TaskCategory`] 选一组基础步骤，再按目标中的关键词追加步骤，
/// 最后把最相关的几条历史经验作为 "Apply insight" 步骤放在末尾。
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    fn base_steps(category: TaskCategory, goal: &str) -> Vec<String> {
        match category {
            TaskCategory::Research => vec![
                format!("Search for sources on {}", goal),
                format!("Collect recent developments about {}", goal),
                "Organize findings by theme".to_string(),
                "Summarize key findings".to_string(),
            ],
            TaskCategory::Development => vec![
                format!("Define requirements for {}", goal),
                "Design the components".to_string(),
                "Implement the core features".to_string(),
                "Test and fix issues".to_string(),
                "Document usage".to_string(),
            ],
            TaskCategory::Analysis => vec![
                format!("Define the scope of {}", goal),
                "Gather data and context".to_string(),
                "Evaluate strengths and weaknesses".to_string(),
                "Draw conclusions and recommendations".to_string(),
            ],
            TaskCategory::Writing => vec![
                format!("Outline the document for {}", goal),
                "Draft the main sections".to_string(),
                "Review and edit the draft".to_string(),
            ],
            TaskCategory::General => vec![
                format!("Clarify what {} requires", goal),
                "Choose an approach".to_string(),
                "Carry out the approach".to_string(),
                "Review the outcome".to_string(),
            ],
        }
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    async fn plan(&self, description: &str, insights: &[Insight]) -> Result<Vec<String>> {
        let goal = description.trim();
        let lowered = goal.to_lowercase();
        let category = TaskCategory::classify(goal);

        let mut steps = Self::base_steps(category, goal);
        for (keywords, extra) in EXTRA_STEPS {
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                steps.extend(extra.iter().map(|s| s.to_string()));
            }
        }
        steps.extend(
            insights
                .iter()
                .take(MAX_INSIGHT_STEPS)
                .map(|insight| format!("Apply insight: {}", insight.outcome)),
        );

        debug!(category = %category, steps = steps.len(), "📐 生成计划");
        Ok(steps)
    }
}
