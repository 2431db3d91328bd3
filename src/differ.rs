//! Plan and summary display

use crate::ui;
use colored::{ColoredString, Colorize};
use provisioner::{ApplySummary, Change, Plan, State};

const NAME_WIDTH: usize = 60;

fn symbol(state: State) -> ColoredString {
    match state {
        State::New => "+".green(),
        State::Updated => "~".yellow(),
        State::Old => "-".red(),
        State::Equal => "=".dimmed(),
    }
}

/// Group changes by owner, keeping plan order.
fn sections(plan: &Plan) -> Vec<(String, Vec<&Change>)> {
    let mut sections: Vec<(String, Vec<&Change>)> = Vec::new();
    for change in &plan.changes {
        let title = change
            .parent
            .as_ref()
            .map_or_else(|| "Zabbix".to_string(), ToString::to_string);
        match sections.last_mut() {
            Some((last, changes)) if *last == title => changes.push(change),
            _ => sections.push((title, vec![change])),
        }
    }
    sections
}

/// Display a dry-run plan
pub fn display_plan(plan: &Plan) {
    if plan.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Zabbix Diff".bold()
    );
    println!("│");

    for (title, changes) in sections(plan) {
        println!("│ {}", title.bold());
        for change in changes {
            println!(
                "│   {} {:<12} {}",
                symbol(change.state),
                change.kind,
                ui::truncate(&change.name, NAME_WIDTH)
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} create, {} update, {} delete, {} unchanged)",
        plan.changes.len().to_string().bold(),
        plan.count(State::New).to_string().green(),
        plan.count(State::Updated).to_string().yellow(),
        plan.count(State::Old).to_string().red(),
        plan.unchanged
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display the result of an apply pass
pub fn display_summary(summary: &ApplySummary) {
    println!();
    ui::kv("Created", &summary.created.to_string());
    ui::kv("Updated", &summary.updated.to_string());
    ui::kv("Deleted", &summary.deleted.to_string());
    ui::kv("Unchanged", &summary.unchanged.to_string());
}
