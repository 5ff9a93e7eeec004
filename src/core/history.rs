//! Read access to closed-period history records.

use crate::{
    core::{
        aggregate::{CategoryAchievement, calculate_progress},
        entity::{EntityKind, EntityRef},
    },
    entities::{TargetHistory, target_history},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use std::collections::BTreeMap;

/// A history record with its category breakdown decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Record ID
    pub id: i64,
    /// Agent or team
    pub entity_type: EntityKind,
    /// ID within its table
    pub entity_id: i64,
    /// First instant of the closed period
    pub period_start: DateTime<Utc>,
    /// Exclusive end of the closed period
    pub period_end: DateTime<Utc>,
    /// Volume target in force
    pub target_volume_cents: i64,
    /// Unit target in force
    pub target_units: i64,
    /// Volume achieved
    pub achieved_volume_cents: i64,
    /// Units achieved
    pub achieved_units: i64,
    /// Volume progress at close
    pub progress_percent: f64,
    /// Per-category figures, when the entity had category targets
    pub by_category: Option<BTreeMap<String, CategoryAchievement>>,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<target_history::Model> for HistoryEntry {
    type Error = Error;

    fn try_from(model: target_history::Model) -> Result<Self> {
        let entity_type = EntityKind::parse(&model.entity_type).ok_or_else(|| Error::Validation {
            message: format!("Unknown entity type '{}' in history", model.entity_type),
        })?;
        let by_category = model
            .category_breakdown
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Self {
            id: model.id,
            entity_type,
            entity_id: model.entity_id,
            period_start: model.period_start,
            period_end: model.period_end,
            target_volume_cents: model.target_volume_cents,
            target_units: model.target_units,
            achieved_volume_cents: model.achieved_volume_cents,
            achieved_units: model.achieved_units,
            progress_percent: calculate_progress(
                model.achieved_volume_cents,
                model.target_volume_cents,
            ),
            by_category,
            recorded_at: model.recorded_at,
        })
    }
}

/// All history of an entity, newest period first.
pub async fn list_history<C>(db: &C, entity: EntityRef) -> Result<Vec<HistoryEntry>>
where
    C: ConnectionTrait,
{
    recent_history(db, entity, None).await
}

/// The newest `limit` history records of an entity, or all of them.
pub async fn recent_history<C>(
    db: &C,
    entity: EntityRef,
    limit: Option<u64>,
) -> Result<Vec<HistoryEntry>>
where
    C: ConnectionTrait,
{
    let mut query = TargetHistory::find()
        .filter(target_history::Column::EntityType.eq(entity.kind.as_str()))
        .filter(target_history::Column::EntityId.eq(entity.id))
        .order_by_desc(target_history::Column::PeriodStart);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }

    query
        .all(db)
        .await?
        .into_iter()
        .map(HistoryEntry::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use chrono::TimeZone;
    use sea_orm::Set;

    async fn insert_record(
        db: &DatabaseConnection,
        entity: EntityRef,
        month: u32,
        breakdown: Option<&str>,
    ) -> Result<()> {
        target_history::ActiveModel {
            entity_type: Set(entity.kind.as_str().to_string()),
            entity_id: Set(entity.id),
            period_start: Set(Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).unwrap()),
            period_end: Set(Utc.with_ymd_and_hms(2024, month + 1, 1, 0, 0, 0).unwrap()),
            target_volume_cents: Set(10_000),
            target_units: Set(10),
            achieved_volume_cents: Set(2_500),
            achieved_units: Set(3),
            category_breakdown: Set(breakdown.map(str::to_string)),
            recorded_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_history_newest_first_with_limit() -> Result<()> {
        let db = setup_test_db().await?;
        let entity = EntityRef::team(4);
        for month in [1, 3, 2] {
            insert_record(&db, entity, month, None).await?;
        }
        insert_record(&db, EntityRef::agent(4), 5, None).await?;

        let all = list_history(&db, entity).await?;
        let months: Vec<u32> = all
            .iter()
            .map(|h| chrono::Datelike::month(&h.period_start))
            .collect();
        assert_eq!(months, vec![3, 2, 1]);
        assert_eq!(all[0].progress_percent, 25.0);

        let recent = recent_history(&db, entity, Some(1)).await?;
        assert_eq!(recent.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_decodes_breakdown() -> Result<()> {
        let db = setup_test_db().await?;
        let entity = EntityRef::agent(1);
        insert_record(
            &db,
            entity,
            6,
            Some(concat!(
                r#"{"solar":{"target_volume_cents":500,"target_units":1,"#,
                r#""achieved_volume_cents":700,"achieved_units":2}}"#
            )),
        )
        .await?;

        let history = list_history(&db, entity).await?;
        let categories = history[0].by_category.as_ref().unwrap();
        assert_eq!(categories["solar"].achieved_volume_cents, 700);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_breakdown_is_an_error() -> Result<()> {
        let db = setup_test_db().await?;
        insert_record(&db, EntityRef::agent(1), 6, Some("not json")).await?;
        assert!(matches!(
            list_history(&db, EntityRef::agent(1)).await,
            Err(Error::Serialization(_))
        ));
        Ok(())
    }
}
