//! CK-072: Plan generation, the dry-run walk summarized per recipe instance.

use super::graph::walk::WalkReport;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// An output does not exist yet.
    Build,
    /// Outputs exist but are out of date.
    Rebuild,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub recipe: String,
    pub targets: Vec<String>,
    pub action: PlanAction,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookPlan {
    pub name: String,
    pub changes: Vec<PlannedChange>,
    pub to_build: u32,
    pub to_rebuild: u32,
    pub unchanged: u32,
}

impl CookPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Summarize a dry-run walk.
pub fn plan(name: &str, walk: &WalkReport) -> CookPlan {
    let mut to_build = 0;
    let mut to_rebuild = 0;
    let changes = walk
        .plan
        .iter()
        .map(|p| {
            let missing = p
                .targets
                .iter()
                .any(|t| p.reason == format!("{} does not exist", t));
            let action = if missing {
                to_build += 1;
                PlanAction::Build
            } else {
                to_rebuild += 1;
                PlanAction::Rebuild
            };
            PlannedChange {
                recipe: p.recipe.clone(),
                targets: p.targets.clone(),
                action,
                reason: p.reason.clone(),
            }
        })
        .collect();
    CookPlan {
        name: name.to_string(),
        changes,
        to_build,
        to_rebuild,
        unchanged: walk.up_to_date,
    }
}

/// Render a plan for the terminal.
pub fn render(plan: &CookPlan) -> String {
    let mut out = format!("Planning: {} ({} recipes)\n\n", plan.name, plan.changes.len());
    for change in &plan.changes {
        let symbol = match change.action {
            PlanAction::Build => "+",
            PlanAction::Rebuild => "~",
        };
        out.push_str(&format!(
            "  {} {} ({})\n",
            symbol,
            change.targets.join(" "),
            change.reason
        ));
    }
    out.push_str(&format!(
        "\nPlan: {} to build, {} to rebuild, {} up to date.\n",
        plan.to_build, plan.to_rebuild, plan.unchanged
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::walk::PlannedRecipe;

    fn walk() -> WalkReport {
        WalkReport {
            up_to_date: 3,
            plan: vec![
                PlannedRecipe {
                    recipe: "%.o".to_string(),
                    targets: vec!["main.o".to_string()],
                    reason: "main.o does not exist".to_string(),
                },
                PlannedRecipe {
                    recipe: "app".to_string(),
                    targets: vec!["app".to_string()],
                    reason: "main.o was rebuilt".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_ck072_actions_from_reasons() {
        let p = plan("demo", &walk());
        assert_eq!(p.to_build, 1);
        assert_eq!(p.to_rebuild, 1);
        assert_eq!(p.unchanged, 3);
        assert_eq!(p.changes[0].action, PlanAction::Build);
        assert_eq!(p.changes[1].action, PlanAction::Rebuild);
    }

    #[test]
    fn test_ck072_render() {
        let text = render(&plan("demo", &walk()));
        assert!(text.starts_with("Planning: demo (2 recipes)"));
        assert!(text.contains("  + main.o (main.o does not exist)"));
        assert!(text.contains("  ~ app (main.o was rebuilt)"));
        assert!(text.contains("Plan: 1 to build, 1 to rebuild, 3 up to date."));
    }

    #[test]
    fn test_ck072_empty() {
        let p = plan("demo", &WalkReport::default());
        assert!(p.is_empty());
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"to_build\":0"));
    }
}
