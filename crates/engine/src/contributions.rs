//! What each live transaction has added to each resource period.
//!
//! Period totals always equal the sum of their contribution rows. A
//! reconciliation applies `wanted - recorded` per period and rewrites the
//! rows of the transaction, so a reversal only ever takes back what was put
//! in.

use sea_orm::{ActiveValue, entity::prelude::*};

use crate::{Money, resource_periods::TotalsDelta};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "period_contributions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub resource_period_id: String,
    pub resource_id: String,
    pub spent_minor: i64,
    pub paid_minor: i64,
    pub withheld_minor: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn delta(&self) -> TotalsDelta {
        TotalsDelta {
            spent: Money::new(self.spent_minor),
            paid: Money::new(self.paid_minor),
            withheld: Money::new(self.withheld_minor),
        }
    }
}

pub fn contribution_id(transaction_id: &str, resource_period_id: &str) -> String {
    format!("{transaction_id}_{resource_period_id}")
}

pub fn active_model(
    transaction_id: &str,
    resource_period_id: &str,
    resource_id: &str,
    delta: TotalsDelta,
) -> ActiveModel {
    ActiveModel {
        id: ActiveValue::Set(contribution_id(transaction_id, resource_period_id)),
        transaction_id: ActiveValue::Set(transaction_id.to_string()),
        resource_period_id: ActiveValue::Set(resource_period_id.to_string()),
        resource_id: ActiveValue::Set(resource_id.to_string()),
        spent_minor: ActiveValue::Set(delta.spent.minor()),
        paid_minor: ActiveValue::Set(delta.paid.minor()),
        withheld_minor: ActiveValue::Set(delta.withheld.minor()),
    }
}
