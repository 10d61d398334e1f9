//! Rollback of a failed Up run back to its floor version.

use chrono::Utc;
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::engine::{MigrationEngine, MigrationRunContext, bookkeeping};
use crate::error::MigrationError;
use crate::migration::{MigrationDirection, UnitKind};
use crate::state::{SchemaState, SchemaStateStore};
use crate::step::StepRunner;

impl<S: SchemaStateStore, R: StepRunner> MigrationEngine<S, R> {
    /// Revert every unit from `failed_version` down to, but not including,
    /// the run's floor.
    ///
    /// The schema state is written once: the floor as clean on success, or
    /// dirty `Down` at the version whose down-step failed.
    pub(crate) async fn rollback(
        &self,
        catalog: &Catalog,
        ctx: &mut MigrationRunContext,
        failed_version: i64,
        failure: MigrationError,
    ) -> MigrationError {
        let floor = ctx.floor;
        info!(from = failed_version, to = floor, "Rolling back");

        for version in ((floor + 1)..=failed_version).rev() {
            let unit = catalog.get(version);
            let outcome = match unit {
                Some(unit) => self.apply(unit, MigrationDirection::Down).await,
                None => Err(MigrationError::other(format!(
                    "no migration unit at version {version}"
                ))),
            };

            if let Err(e) = outcome {
                let (kind, is_custom) =
                    unit.map_or((UnitKind::File, false), |u| (u.kind(), u.is_custom()));
                let dirty = SchemaState::Dirty {
                    version,
                    direction: Some(MigrationDirection::Down),
                    is_custom,
                };
                let recorded = self.store.save(&ctx.state, &dirty).await;
                if recorded.is_ok() {
                    ctx.state = dirty;
                }

                let rollback = MigrationError::StepFailed {
                    version,
                    kind,
                    direction: MigrationDirection::Down,
                    source: Box::new(e),
                    bookkeeping: recorded.err().map(|e| Box::new(bookkeeping(version, e))),
                };
                self.log(&rollback);

                let err = MigrationError::RollbackFailed {
                    failure: Box::new(failure),
                    rollback: Box::new(rollback),
                };
                error!(error = %err, "Rollback failed");
                return err;
            }

            info!(version, "Rolled back migration");
            self.logger
                .log_event(Utc::now(), &format!("rolled back migration {version}"));
        }

        let restored = SchemaState::clean(floor, catalog.is_custom(floor));
        if let Err(e) = self.store.save(&ctx.state, &restored).await {
            let err = MigrationError::RollbackFailed {
                failure: Box::new(failure),
                rollback: Box::new(bookkeeping(floor, e)),
            };
            self.log(&err);
            return err;
        }
        ctx.state = restored;

        let err = MigrationError::RolledBack {
            failure: Box::new(failure),
            version: floor,
        };
        self.log(&err);
        err
    }
}
