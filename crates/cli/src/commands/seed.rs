use procura_core::config::{AppConfig, LoadOptions};
use procura_core::domain::actor::{Role, UserId};
use procura_db::{connect, migrations, RoleDirectory, SqlRoleDirectory};

use crate::commands::CommandResult;

/// One demo profile per role. Provisioning is the explicit post-registration
/// step the role directory owns; re-running the seed never clobbers roles
/// that were changed since.
const DEMO_USERS: &[(&str, Role)] = &[
    ("demo-staff", Role::Staff),
    ("demo-approver-l1", Role::ApproverL1),
    ("demo-approver-l2", Role::ApproverL2),
    ("demo-finance", Role::Finance),
    ("demo-admin", Role::Admin),
];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match crate::commands::runtime() {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let directory = SqlRoleDirectory::new(pool.clone());
        let mut provisioned = 0usize;
        for (user_id, role) in DEMO_USERS {
            directory
                .provision(&UserId((*user_id).to_string()), *role)
                .await
                .map_err(|error| ("seed", error.to_string(), 6u8))?;
            provisioned += 1;
        }

        pool.close().await;
        Ok::<usize, (&'static str, String, u8)>(provisioned)
    });

    match result {
        Ok(count) => {
            CommandResult::success("seed", format!("provisioned {count} demo user profiles"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
