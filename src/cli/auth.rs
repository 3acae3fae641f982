//! CLI auth command handlers for login, status, and logout.

use std::sync::Arc;

use crate::auth::providers::microsoft::MicrosoftAuth;
use crate::auth::{AuthPhase, NoopLinkOpener, SignInFlow, SystemLinkOpener};
use crate::config::EmberConfig;
use crate::error::RecoveryAction;

fn microsoft_auth() -> MicrosoftAuth {
    let config = EmberConfig::from_env();
    let credentials = Arc::new(config.credential_service());
    let mut auth = MicrosoftAuth::new(credentials);
    if let Some(client_id) = config.client_id {
        auth = auth.with_client_id(client_id);
    }
    if let Some(market) = config.market {
        auth = auth.with_market(market);
    }
    auth
}

/// Handle `ember auth login`.
pub async fn handle_login() -> Result<(), Box<dyn std::error::Error>> {
    let flow = SignInFlow::new(
        Arc::new(microsoft_auth()),
        Arc::new(SystemLinkOpener),
        Arc::new(NoopLinkOpener),
    );

    let mut events = flow.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_phase = None;
        while let Some(snapshot) = events.recv().await {
            if last_phase == Some(snapshot.phase) {
                continue;
            }
            last_phase = Some(snapshot.phase);
            match snapshot.phase {
                AuthPhase::Starting => println!("⏳ Requesting device code..."),
                AuthPhase::Waiting => {
                    if let (Some(uri), Some(code)) =
                        (&snapshot.verification_uri, &snapshot.user_code)
                    {
                        println!("🔗 Visit: {uri}");
                        println!("📋 Enter code: {code}");
                    }
                    println!(
                        "⏳ Waiting for authorization ({}s)...",
                        snapshot.seconds_left
                    );
                }
                AuthPhase::Linking => println!("🔁 Finalizing sign-in..."),
                AuthPhase::Done | AuthPhase::Error => break,
            }
        }
    });

    let outcome = flow.run().await;
    printer.abort();

    match outcome.phase {
        AuthPhase::Done => {
            let name = outcome
                .profile
                .map(|profile| profile.name)
                .unwrap_or_default();
            println!("✅ Signed in as {name}");
            Ok(())
        }
        AuthPhase::Error => {
            let error = outcome.error.expect("error phase carries an error");
            eprintln!("❌ Sign-in failed: {}", error.message);
            match error.recovery {
                RecoveryAction::Restart => eprintln!("   Run `ember auth login` again."),
                RecoveryAction::ReloadOrBack => eprintln!("   Check your connection and retry."),
            }
            std::process::exit(1);
        }
        _ => Ok(()),
    }
}

/// Handle `ember auth status`.
pub async fn handle_status() -> Result<(), Box<dyn std::error::Error>> {
    let auth = microsoft_auth();
    if !auth.is_signed_in()? {
        println!("Not signed in.");
        return Ok(());
    }
    match auth.fetch_profile_from_stored_refresh().await {
        Ok(profile) => println!("Signed in as {} ({})", profile.name, profile.id),
        Err(err) => println!("Credentials stored but unusable: {err}"),
    }
    Ok(())
}

/// Handle `ember auth logout`.
pub async fn handle_logout() -> Result<(), Box<dyn std::error::Error>> {
    microsoft_auth().sign_out()?;
    println!("Signed out.");
    Ok(())
}
