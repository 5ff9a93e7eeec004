//! Dashboard generation.
//!
//! Builds the ranked standings shown on the TV display. Achieved figures are
//! aggregated from sales at read time for each entity's current period, so
//! the dashboard never depends on the reset engine having run recently.

use crate::{
    core::{
        aggregate::{CategoryAchievement, aggregate, calculate_progress, format_amount},
        cycle::Period,
        entity::{CycleBearer, EntityKind},
        reset::effective_period,
        settings,
        store::{CycleStore, SeaOrmStore},
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{instrument, warn};

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    /// Position, 1-based; entities with equal progress and volume share a rank
    pub rank: usize,
    /// Agent or team
    pub entity_type: EntityKind,
    /// ID within its table
    pub entity_id: i64,
    /// Display name
    pub name: String,
    /// Team of an agent
    pub team_id: Option<i64>,
    /// Current period
    pub period: Period,
    /// Volume target
    pub target_volume_cents: i64,
    /// Unit target
    pub target_units: i64,
    /// Volume achieved so far
    pub achieved_volume_cents: i64,
    /// Units achieved so far
    pub achieved_units: i64,
    /// Volume progress in percent
    pub progress_percent: f64,
    /// Achieved volume formatted with the display currency
    pub achieved_display: String,
    /// Per-category figures, when category targets exist
    pub by_category: Option<BTreeMap<String, CategoryAchievement>>,
}

/// Everything the display needs in one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Display currency code
    pub currency: String,
    /// When this snapshot was computed
    pub generated_at: DateTime<Utc>,
    /// When the reset engine last completed a pass
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Ranked agents
    pub agents: Vec<Standing>,
    /// Ranked teams
    pub teams: Vec<Standing>,
}

/// Computes the standing of one entity at `now`, unranked.
pub async fn compute_standing(
    store: &dyn CycleStore,
    entity: &dyn CycleBearer,
    now: DateTime<Utc>,
    currency: &str,
) -> Result<Standing> {
    let entity_ref = entity.entity_ref();
    let period = effective_period(entity, now)?;
    let sales = store.sales_in_window(entity_ref, &period).await?;
    let goals = store.category_goals(entity_ref).await?;
    let achievement = aggregate(entity_ref, &period, &sales, &goals);
    let targets = entity.targets();

    Ok(Standing {
        rank: 0,
        entity_type: entity_ref.kind,
        entity_id: entity_ref.id,
        name: entity.display_name().to_string(),
        team_id: entity.group_id(),
        period,
        target_volume_cents: targets.volume_cents,
        target_units: targets.units,
        achieved_volume_cents: achievement.volume_cents,
        achieved_units: achievement.units,
        progress_percent: calculate_progress(achievement.volume_cents, targets.volume_cents),
        achieved_display: format_amount(achievement.volume_cents, currency),
        by_category: achievement.by_category,
    })
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.progress_percent
        .total_cmp(&a.progress_percent)
        .then_with(|| b.achieved_volume_cents.cmp(&a.achieved_volume_cents))
}

/// Sorts standings best first and assigns competition ranks (1, 1, 3, ...).
pub fn rank_standings(standings: &mut [Standing]) {
    standings.sort_by(|a, b| compare(a, b).then_with(|| a.name.cmp(&b.name)));

    let mut rank = 0;
    for index in 0..standings.len() {
        if index == 0 || compare(&standings[index - 1], &standings[index]) != Ordering::Equal {
            rank = index + 1;
        }
        standings[index].rank = rank;
    }
}

/// Builds the full dashboard at `now`.
///
/// Entities whose figures cannot be computed are left out and logged rather
/// than failing the whole read.
#[instrument(skip(store))]
pub async fn build_dashboard(store: &SeaOrmStore, now: DateTime<Utc>) -> Result<Dashboard> {
    let db = store.connection();
    let currency = settings::currency_or_default(db).await?;
    let last_pass_at = settings::get_last_pass_at(db).await?;

    let mut agents = Vec::new();
    let mut teams = Vec::new();
    for entity in store.cycle_entities().await? {
        match compute_standing(store, entity.as_ref(), now, &currency).await {
            Ok(standing) => match standing.entity_type {
                EntityKind::Agent => agents.push(standing),
                EntityKind::Team => teams.push(standing),
            },
            Err(e) => warn!("Leaving {} off the dashboard: {}", entity.entity_ref(), e),
        }
    }

    rank_standings(&mut agents);
    rank_standings(&mut teams);

    Ok(Dashboard {
        currency,
        generated_at: now,
        last_pass_at,
        agents,
        teams,
    })
}

/// Formats a standing as a single text line, e.g. `#1 Ava: USD 1,000.00 (40.0%)`.
#[must_use]
pub fn format_standing_line(standing: &Standing) -> String {
    format!(
        "#{} {}: {} ({:.1}%)",
        standing.rank, standing.name, standing.achieved_display, standing.progress_percent
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::{agent, settings::set_currency, targets::TargetUpdate};
    use crate::test_utils::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn standing(name: &str, progress: f64, volume: i64) -> Standing {
        Standing {
            rank: 0,
            entity_type: EntityKind::Agent,
            entity_id: 0,
            name: name.to_string(),
            team_id: None,
            period: Period {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            },
            target_volume_cents: 0,
            target_units: 0,
            achieved_volume_cents: volume,
            achieved_units: 0,
            progress_percent: progress,
            achieved_display: String::new(),
            by_category: None,
        }
    }

    #[test]
    fn test_rank_standings_shares_ties() {
        let mut rows = vec![
            standing("Cy", 50.0, 500),
            standing("Ava", 80.0, 800),
            standing("Ben", 50.0, 500),
            standing("Dee", 10.0, 900),
        ];
        rank_standings(&mut rows);

        let order: Vec<(&str, usize)> = rows.iter().map(|s| (s.name.as_str(), s.rank)).collect();
        assert_eq!(order, vec![("Ava", 1), ("Ben", 2), ("Cy", 2), ("Dee", 4)]);
    }

    #[test]
    fn test_format_standing_line() {
        let mut row = standing("Ava", 40.0, 100_000);
        row.rank = 1;
        row.achieved_display = "USD 1,000.00".to_string();
        assert_eq!(format_standing_line(&row), "#1 Ava: USD 1,000.00 (40.0%)");
    }

    #[tokio::test]
    async fn test_build_dashboard_aggregates_current_period() -> Result<()> {
        let db = setup_test_db().await?;
        set_currency(&db, "EUR").await?;
        let team = create_test_team(&db, "North").await?;
        let ava = create_test_agent(&db, "Ava", Some(team.id)).await?;
        let ben = create_test_agent(&db, "Ben", Some(team.id)).await?;

        let now = Utc::now();
        let update = TargetUpdate {
            target_volume_cents: 100_000,
            target_units: 10,
            target_cycle: "monthly".to_string(),
            reset_day: 1,
            reset_month: None,
            categories: None,
        };
        agent::update_agent_targets(&db, ava.id, &update, now).await?;
        agent::update_agent_targets(&db, ben.id, &update, now).await?;

        let period_start = ava.period_start.unwrap();
        create_sale_at(&db, ava.id, 40_000, 2, period_start).await?;
        create_sale_at(&db, ben.id, 60_000, 3, period_start + chrono::Duration::seconds(1)).await?;
        create_sale_at(&db, ben.id, 99_000, 9, period_start - chrono::Duration::seconds(1)).await?;

        let store = SeaOrmStore::new(Arc::new(db));
        let dashboard = build_dashboard(&store, now).await?;

        assert_eq!(dashboard.currency, "EUR");
        assert_eq!(dashboard.agents.len(), 2);
        assert_eq!(dashboard.agents[0].name, "Ben");
        assert_eq!(dashboard.agents[0].progress_percent, 60.0);
        assert_eq!(dashboard.agents[1].achieved_display, "EUR 400.00");
        assert_eq!(dashboard.teams.len(), 1);
        assert_eq!(dashboard.teams[0].achieved_volume_cents, 100_000);
        assert_eq!(dashboard.teams[0].achieved_units, 5);
        Ok(())
    }
}
