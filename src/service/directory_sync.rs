// service/directory_sync.rs
//
// The directory query itself happens elsewhere; this turns the records it
// returns into local accounts.
use serde::Serialize;

use crate::{
    db::db::HelpdeskStore,
    models::{
        settingsmodel::DirectoryUser,
        usermodel::{Actor, NewUser, UserRole},
    },
    service::{error::ServiceError, ticket_service::require_admin},
    utils::password,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportedAccount {
    pub username: String,
    pub email: String,
    /// Shown once; only the hash is stored.
    pub initial_password: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DirectoryImport {
    pub imported: Vec<ImportedAccount>,
    pub skipped: usize,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Imports directory records as regular users. Records without a username,
/// or clashing with an existing username or e-mail, are skipped.
pub async fn import_directory_users<S: HelpdeskStore>(
    store: &S,
    actor: &Actor,
    records: &[DirectoryUser],
) -> Result<DirectoryImport, ServiceError> {
    require_admin(actor, "import directory users")?;

    let domain = store
        .get_settings()
        .await?
        .and_then(|settings| non_empty(&settings.ad_domain))
        .unwrap_or_else(|| "local".to_string());

    let mut skipped = 0;
    let mut passwords = Vec::with_capacity(records.len());
    let mut users = Vec::with_capacity(records.len());

    for record in records {
        let Some(username) = non_empty(&record.username) else {
            skipped += 1;
            continue;
        };
        if passwords.iter().any(|(known, _): &(String, String)| *known == username) {
            skipped += 1;
            continue;
        }

        let email = non_empty(&record.email).unwrap_or_else(|| format!("{}@{}", username, domain));
        let initial_password = password::generate_initial_password();
        let password_hash = password::hash(initial_password.as_str())
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        users.push(NewUser {
            username: username.clone(),
            email,
            fullname: non_empty(&record.display_name),
            password_hash,
            role: UserRole::User,
            is_technician: false,
        });
        passwords.push((username, initial_password));
    }

    let (created, existing) = store.import_users(users).await?;
    skipped += existing;

    let imported = created
        .into_iter()
        .filter_map(|user| {
            let initial_password = passwords
                .iter()
                .find(|(username, _)| *username == user.username)
                .map(|(_, password)| password.clone())?;
            Some(ImportedAccount {
                username: user.username,
                email: user.email,
                initial_password,
            })
        })
        .collect::<Vec<_>>();

    tracing::info!(
        "Directory import by {}: {} imported, {} skipped",
        actor.username,
        imported.len(),
        skipped
    );

    Ok(DirectoryImport { imported, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memorydb::MemoryStore, userdb::UserExt};

    fn record(username: Option<&str>, email: Option<&str>, display_name: Option<&str>) -> DirectoryUser {
        DirectoryUser {
            username: username.map(str::to_string),
            email: email.map(str::to_string),
            display_name: display_name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn imports_new_accounts_and_skips_the_rest() {
        let store = MemoryStore::new();
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        store.seed_user("ana", UserRole::User, false).await;

        let records = vec![
            record(Some("bruno"), Some("bruno@corp.local"), Some("Bruno Lima")),
            record(Some("carla"), None, None),
            record(Some("ana"), Some("ana.nova@corp.local"), None),
            record(None, Some("ghost@corp.local"), Some("Ghost")),
            record(Some("  "), None, None),
            record(Some("bruno"), Some("outro@corp.local"), None),
        ];

        let result = import_directory_users(&store, &Actor::from(&admin), &records).await.unwrap();

        assert_eq!(result.skipped, 4);
        let usernames: Vec<_> = result.imported.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(usernames, vec!["bruno", "carla"]);
        assert_eq!(result.imported[1].email, "carla@local");

        let bruno = store.get_user(None, Some("bruno"), None).await.unwrap().unwrap();
        assert_eq!(bruno.fullname.as_deref(), Some("Bruno Lima"));
        assert_eq!(bruno.role, UserRole::User);
        assert!(password::compare(&result.imported[0].initial_password, &bruno.password).unwrap());
    }

    #[tokio::test]
    async fn only_admins_import() {
        let store = MemoryStore::new();
        let user = store.seed_user("ana", UserRole::User, true).await;

        let err = import_directory_users(&store, &Actor::from(&user), &[record(Some("x"), None, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));
    }
}
