use chrono::Utc;
use sea_orm::TransactionTrait;

use crate::{
    ChecklistItem, ChecklistPatch, EngineError, Money, Principal, ResourcePeriod, ResultEngine,
    resources::ResourceKind,
    util::normalize_required_name,
};

use super::{Engine, with_tx};

fn non_negative(amount: Money, label: &str) -> ResultEngine<Money> {
    if amount.is_negative() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must not be negative"
        )));
    }
    Ok(amount)
}

impl Engine {
    /// Read-modify-write of a budget period's checklist inside one store
    /// transaction. Only the period owner may touch it.
    async fn edit_checklist<T>(
        &self,
        principal: &Principal,
        period_id: &str,
        edit: impl FnOnce(&mut ResourcePeriod) -> ResultEngine<T>,
    ) -> ResultEngine<T> {
        let now = Utc::now();
        with_tx!(self, |db_tx| {
            let mut period = Self::load_period(&db_tx, period_id).await?;
            if period.owner_id != principal.uid {
                return Err(EngineError::Forbidden(
                    "only the owner can edit a checklist".to_string(),
                ));
            }
            if period.resource_kind != ResourceKind::Budget {
                return Err(EngineError::InvalidField(
                    "checklists exist on budget periods only".to_string(),
                ));
            }
            let out = edit(&mut period)?;
            period.updated_at = now;
            Self::save_period(&db_tx, &period).await?;
            Ok::<_, EngineError>(out)
        })
    }

    pub async fn add_checklist_item(
        &self,
        principal: &Principal,
        period_id: &str,
        name: &str,
        expected_amount: Money,
    ) -> ResultEngine<ChecklistItem> {
        let name = normalize_required_name(name, "checklist item")?;
        let expected_amount = non_negative(expected_amount, "expected amount")?;
        let item = self
            .edit_checklist(principal, period_id, |period| {
                let item = ChecklistItem::new(name, expected_amount, Utc::now());
                period.checklist.push(item.clone());
                Ok(item)
            })
            .await?;
        tracing::debug!(period_id, item_id = %item.id, "checklist item added");
        Ok(item)
    }

    pub async fn update_checklist_item(
        &self,
        principal: &Principal,
        period_id: &str,
        item_id: &str,
        patch: ChecklistPatch,
    ) -> ResultEngine<ChecklistItem> {
        let name = patch
            .name
            .as_deref()
            .map(|name| normalize_required_name(name, "checklist item"))
            .transpose()?;
        let expected = patch
            .expected_amount
            .map(|amount| non_negative(amount, "expected amount"))
            .transpose()?;
        let actual = patch
            .actual_amount
            .map(|amount| non_negative(amount, "actual amount"))
            .transpose()?;
        self.edit_checklist(principal, period_id, |period| {
            let item = period.checklist_item_mut(item_id)?;
            if let Some(name) = name {
                item.name = name;
            }
            if let Some(expected) = expected {
                item.expected_amount = expected;
            }
            if let Some(actual) = actual {
                item.actual_amount = actual;
            }
            Ok(item.clone())
        })
        .await
    }

    pub async fn toggle_checklist_item(
        &self,
        principal: &Principal,
        period_id: &str,
        item_id: &str,
    ) -> ResultEngine<ChecklistItem> {
        self.edit_checklist(principal, period_id, |period| {
            let item = period.checklist_item_mut(item_id)?;
            item.is_checked = !item.is_checked;
            Ok(item.clone())
        })
        .await
    }

    pub async fn delete_checklist_item(
        &self,
        principal: &Principal,
        period_id: &str,
        item_id: &str,
    ) -> ResultEngine<()> {
        self.edit_checklist(principal, period_id, |period| {
            let before = period.checklist.len();
            period.checklist.retain(|item| item.id != item_id);
            if period.checklist.len() == before {
                return Err(EngineError::KeyNotFound(format!("checklist item {item_id}")));
            }
            Ok(())
        })
        .await?;
        tracing::debug!(period_id, item_id, "checklist item deleted");
        Ok(())
    }
}
