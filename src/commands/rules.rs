//! Rules command implementation.
//!
//! Lists nickname rules in evaluation order and optionally classifies a
//! command line given on the command line.

use crate::config::Config;

/// Renders the rule listing.
fn render_rules(config: &Config, verbose: bool) -> Result<String, Box<dyn std::error::Error>> {
    let classifier = config.classifier()?;
    let reducible = config.reducible();
    let mut out = String::new();

    out.push_str("📋 Nickname rules (evaluated in this order, last match wins)\n");
    out.push_str("============================================================\n");

    for (position, rule) in classifier.rules().enumerate() {
        let reduced = reducible.contains(&rule.nickname);
        if verbose {
            out.push_str(&format!(
                "{:>3}. {:<12} {:<8} {}\n",
                position + 1,
                rule.nickname,
                if reduced { "reduced" } else { "-" },
                rule.pattern
            ));
        } else {
            out.push_str(&format!("{:>3}. {:<12} {}\n", position + 1, rule.nickname, rule.pattern));
        }
    }

    // Reducible nicknames with no rule only ever match by short process name.
    let orphans: Vec<&String> = reducible
        .iter()
        .filter(|n| classifier.pattern(n).is_none())
        .collect();
    if verbose && !orphans.is_empty() {
        out.push_str("\nReduced by process name only: ");
        out.push_str(
            &orphans
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push('\n');
    }

    out.push_str(&format!(
        "\nTotal: {} rules, {} reduced nicknames\n",
        classifier.len(),
        reducible.len()
    ));
    Ok(out)
}

/// Lists rules, or classifies `classify` when given.
pub fn command_rules(
    verbose: bool,
    classify: Option<String>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(cmdline) = classify {
        let classifier = config.classifier()?;
        // No short name here; fall back to the first word of the command line.
        let name = cmdline
            .split_whitespace()
            .next()
            .and_then(|arg0| arg0.rsplit('/').next())
            .unwrap_or("");
        let nickname = classifier.classify(&cmdline, name);
        let reduced = config.reducible().contains(&nickname);
        println!(
            "{}{}",
            nickname,
            if reduced { " (reduced)" } else { "" }
        );
        return Ok(());
    }

    print!("{}", render_rules(config, verbose)?);
    Ok(())
}
