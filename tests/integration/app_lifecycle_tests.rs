/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use tempfile::TempDir;

use emotia::api;
use emotia::app_config::Config;
use emotia::app_controller::{Controller, SEED_ACCOUNTS};

use crate::common::{get, post_json, send};

fn controller_in(dir: &TempDir) -> Result<Controller> {
    let mut config = Config::default();
    config.database.path = Some(dir.path().join("emotia.db"));
    config.auth.bcrypt_cost = 4;
    config.auth.jwt_secret = "lifecycle-secret".to_string();
    config.inference.labels_path = dir.path().join("missing-labels.json");
    Controller::with_config(config)
}

/// A fresh database has every table and no rows
#[test]
fn test_initDb_withFreshPath_shouldCreateEmptySchema() -> Result<()> {
    let dir = TempDir::new()?;
    let controller = controller_in(&dir)?;

    let stats = controller.init_db()?;

    assert_eq!(stats.user_count, 0);
    assert_eq!(stats.session_count, 0);
    assert_eq!(stats.detection_count, 0);
    assert!(dir.path().join("emotia.db").exists());
    Ok(())
}

/// Seeded demo accounts can log in through the router built by the controller
#[tokio::test]
async fn test_seededAccounts_shouldLogInThroughRouter() -> Result<()> {
    let dir = TempDir::new()?;
    let controller = controller_in(&dir)?;
    assert_eq!(controller.seed().await?, SEED_ACCOUNTS.len());

    let app = api::router(controller.build_state()?);

    for account in SEED_ACCOUNTS {
        let (status, body) = send(
            &app,
            post_json(
                "/login",
                None,
                &json!({ "username": account.username, "password": account.password }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", account.username);
        assert_eq!(body["role"], account.role.to_string());
    }
    Ok(())
}

/// State survives reopening the same database file
#[test]
fn test_seed_thenReopen_shouldKeepAssignment() -> Result<()> {
    let dir = TempDir::new()?;

    tokio_test::block_on(async {
        controller_in(&dir)?.seed().await?;

        let controller = controller_in(&dir)?;
        assert_eq!(controller.seed().await?, 0);
        assert_eq!(controller.init_db()?.user_count, 3);

        let state = controller.build_state()?;
        let patient = state.repository.find_user_by_login("paciente").await?.expect("seeded patient");
        let app = api::router(state);

        let (status, body) = send(&app, get(&format!("/chat/assigned/{}", patient.id), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["psychologist_name"], "psicologo");
        assert_eq!(body["psychologist_email"], "lgarcia@emotia.com");
        Ok(())
    })
}

/// A configured secret makes tokens valid across controllers
#[tokio::test]
async fn test_tokenService_withConfiguredSecret_shouldAcceptTokensAcrossRestarts() -> Result<()> {
    let dir = TempDir::new()?;
    let first = controller_in(&dir)?;
    first.seed().await?;
    let state = first.build_state()?;
    let admin = state.repository.find_user_by_login("admin").await?.expect("seeded admin");
    let token = state.tokens.issue(&admin)?;

    let restarted = api::router(controller_in(&dir)?.build_state()?);
    let (status, body) = send(&restarted, get("/me", Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "admin@emotia.com");
    Ok(())
}
