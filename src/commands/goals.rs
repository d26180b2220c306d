use anyhow::Result;

use crate::commands::CommandReport;
use crate::organizer::lock::VaultLock;
use crate::organizer::paths::VaultPaths;
use crate::organizer::trajectory::TrajectoryStore;

#[derive(Debug, Clone)]
pub enum GoalsAction {
    List,
    Add(String),
    Clear,
}

pub fn run(paths: &VaultPaths, action: &GoalsAction) -> Result<CommandReport> {
    let mut report = CommandReport::new("goals");

    if let GoalsAction::List = action {
        let store = TrajectoryStore::load(&paths.state_file)?;
        list(&store, &mut report);
        return Ok(report);
    }

    paths.ensure_layout()?;
    let _lock = VaultLock::acquire(&paths.lock_file())?;
    let mut store = TrajectoryStore::load(&paths.state_file)?;
    match action {
        GoalsAction::Add(goal) => {
            if goal.trim().is_empty() {
                report.issue("goal text is empty");
                return Ok(report);
            }
            if store.add_goal(goal) {
                store.save()?;
                report.detail(format!("added goal: {}", goal.trim()));
            } else {
                report.detail(format!("goal already present: {}", goal.trim()));
            }
        }
        GoalsAction::Clear => {
            let removed = store.clear_goals();
            store.save()?;
            report.detail(format!("cleared {removed} goals"));
        }
        GoalsAction::List => {}
    }
    list(&store, &mut report);
    Ok(report)
}

fn list(store: &TrajectoryStore, report: &mut CommandReport) {
    let goals = &store.state().current_goals;
    report.detail(format!("goals={}", goals.len()));
    for (idx, goal) in goals.iter().enumerate() {
        report.detail(format!("{}. {goal}", idx + 1));
    }
}
