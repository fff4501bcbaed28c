use anyhow::{anyhow, Context, Result};
use migrator::StepName;
use migrator::features::migration::AssetImportReport;
use migrator::Orchestrator;

pub async fn export_assets(orchestrator: &mut Orchestrator) -> Result<()> {
    orchestrator
        .connect_source()
        .await
        .context("Failed to connect to Mattermost")?;
    let export = orchestrator.export_assets().await?;

    let summary = export.summary;
    println!("Exported assets to {}", export.output_file.display());
    println!(
        "  users:    {} ({} deleted skipped)",
        summary.users.exported, summary.users.deleted
    );
    println!(
        "  teams:    {} ({} deleted skipped)",
        summary.teams.exported, summary.teams.deleted
    );
    println!(
        "  channels: {} ({} public, {} private, {} deleted skipped)",
        summary.channels.exported,
        export.stats.channels_public,
        export.stats.channels_private,
        summary.channels.deleted
    );
    Ok(())
}

pub async fn import_assets(orchestrator: &mut Orchestrator) -> Result<()> {
    orchestrator
        .connect_destination()
        .await
        .context("Failed to connect to Matrix")?;
    let report = orchestrator.import_assets().await?;

    for line in import_summary(&report) {
        println!("{}", line);
    }
    Ok(())
}

/// Operator-facing lines for a finished asset import
pub fn import_summary(report: &AssetImportReport) -> Vec<String> {
    let stats = &report.stats;
    let mut lines = vec![
        format!("Imported assets (deduplicated against {})", report.resumed_from),
        format!("  users:  {}", stats.users),
        format!("  spaces: {}", stats.spaces),
        format!("  rooms:  {}", stats.rooms),
        format!(
            "  links:  {} linked, {} failed, {} parent pointers failed",
            stats.links.linked, stats.links.link_failed, stats.links.parent_failed
        ),
        format!(
            "Mapping written to {} ({} users, {} spaces, {} rooms)",
            report.output_file.display(),
            report.mapping.users_count,
            report.mapping.teams_count,
            report.mapping.channels_count
        ),
    ];
    // Later imports only link rooms or spaces they create themselves
    if stats.links.link_failed > 0 {
        lines.push(format!(
            "Warning: {} room(s) were not added to their space. A later import will not retry \
             them; add them by hand (the [Link] errors above name each room and space id).",
            stats.links.link_failed
        ));
    }
    lines
}

pub async fn export_memberships(orchestrator: &mut Orchestrator) -> Result<()> {
    orchestrator
        .connect_source()
        .await
        .context("Failed to connect to Mattermost")?;
    let export = orchestrator.export_memberships().await?;

    println!("Exported memberships to {}", export.output_file.display());
    println!(
        "  team members:    {} ({} deleted skipped)",
        export.summary.team_members.exported, export.summary.team_members.deleted
    );
    println!(
        "  channel members: {}",
        export.summary.channel_members.exported
    );
    Ok(())
}

pub async fn import_memberships(orchestrator: &mut Orchestrator) -> Result<()> {
    orchestrator
        .connect_destination()
        .await
        .context("Failed to connect to Matrix")?;
    let report = orchestrator.import_memberships().await?;

    let stats = report.stats;
    println!("Imported memberships");
    println!(
        "  teams:    {} added, {} skipped, {} failed",
        stats.team.added, stats.team.skipped, stats.team.failed
    );
    println!(
        "  channels: {} added, {} skipped, {} failed",
        stats.channel.added, stats.channel.skipped, stats.channel.failed
    );
    Ok(())
}

pub async fn skip(orchestrator: &mut Orchestrator, step: &str, reason: &str) -> Result<()> {
    let step: StepName = step.parse().map_err(|e: String| anyhow!(e))?;
    orchestrator.skip_step(step, reason).await?;
    println!("Marked {} as skipped: {}", step, reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator::features::migration::pipelines::{ImportStats, LinkStats};
    use migrator::features::migration::{MappingSource, MappingStats};
    use std::path::PathBuf;

    fn report(links: LinkStats) -> AssetImportReport {
        AssetImportReport {
            output_file: PathBuf::from("mappings/mapping_1.json"),
            stats: ImportStats {
                links,
                ..ImportStats::default()
            },
            resumed_from: MappingSource::Fresh,
            mapping: MappingStats::default(),
        }
    }

    #[test]
    fn test_unlinked_rooms_are_called_out() {
        let lines = import_summary(&report(LinkStats {
            linked: 3,
            link_failed: 2,
            parent_failed: 0,
        }));

        let warning = lines.last().unwrap();
        assert!(warning.starts_with("Warning: 2 room(s)"));
        assert!(warning.contains("will not retry"));
    }

    #[test]
    fn test_clean_import_has_no_warning() {
        let lines = import_summary(&report(LinkStats {
            linked: 3,
            link_failed: 0,
            parent_failed: 1,
        }));

        assert!(lines.iter().all(|line| !line.starts_with("Warning")));
        assert!(lines.iter().any(|line| line.contains("1 parent pointers failed")));
    }
}
