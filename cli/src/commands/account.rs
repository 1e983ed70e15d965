use anyhow::{Result, bail};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crema_core::leaderboard::MAX_LIMIT;
use crema_core::level::{Level, TIERS, level_for};
use crema_core::models::Stats;
use crema_core::session::Identity;
use crema_core::sync::{MigrationOutcome, StoreKind};

use super::App;
use super::helpers::{level_line, print_json, truncate};
use crate::config::Config;

#[derive(Serialize)]
struct StatusReport<'a> {
    signed_in: bool,
    identity: Option<&'a Identity>,
    points: u64,
    level: Level,
    stats: Stats,
    store: &'static str,
    remote: Option<String>,
}

fn describe_migration(outcome: Option<MigrationOutcome>) -> Option<String> {
    match outcome {
        Some(MigrationOutcome::Migrated(stats)) => Some(format!(
            "Moved {} brews, {} recipes and {} shops from this device to your account.",
            stats.brews, stats.drinks, stats.shops
        )),
        Some(MigrationOutcome::RemoteHasData | MigrationOutcome::NothingToMigrate) => None,
        None => Some(
            "Warning: could not sync with your account; run with RUST_LOG=error for details"
                .to_string(),
        ),
    }
}

pub(crate) async fn cmd_login(
    app: &mut App,
    config: &Config,
    uid: &str,
    email: Option<String>,
    name: Option<String>,
    json: bool,
) -> Result<()> {
    let uid = uid.trim();
    if uid.is_empty() {
        bail!("User id must not be empty");
    }
    if app.identity().is_some_and(|current| current.uid == uid) {
        if json {
            return print_json(&app.identity());
        }
        println!("Already signed in as {uid}");
        return Ok(());
    }

    let identity = Identity {
        uid: uid.to_string(),
        email: email.filter(|e| !e.trim().is_empty()),
        display_name: name.filter(|n| !n.trim().is_empty()),
    };
    app.handle_auth_change(Some(identity.clone())).await?;
    config.save_session(&identity)?;

    if json {
        return print_status(app, true);
    }
    println!("Signed in as {uid}");
    if let Some(message) = describe_migration(app.policy().last_migration()) {
        println!("{message}");
    }
    let stats = app.stats();
    println!(
        "Your account has {} brews, {} recipes, {} shops",
        stats.brews, stats.drinks, stats.shops
    );
    println!("{}", level_line(app.points(), &app.level()));
    Ok(())
}

pub(crate) async fn cmd_logout(app: &mut App, config: &Config, json: bool) -> Result<()> {
    let was_signed_in = app.identity().is_some();
    if was_signed_in {
        app.handle_auth_change(None).await?;
    }
    config.clear_session()?;

    if json {
        let stats = app.stats();
        println!(
            "{}",
            serde_json::json!({ "signed_out": was_signed_in, "local": stats })
        );
        return Ok(());
    }
    if !was_signed_in {
        println!("Not signed in");
        return Ok(());
    }
    let stats = app.stats();
    println!(
        "Signed out. This device has {} brews, {} recipes, {} shops",
        stats.brews, stats.drinks, stats.shops
    );
    Ok(())
}

fn print_status(app: &App, json: bool) -> Result<()> {
    let remote = app.policy().remote().remote_url().map(ToString::to_string);
    let report = StatusReport {
        signed_in: app.identity().is_some(),
        identity: app.identity(),
        points: app.points(),
        level: app.level(),
        stats: app.stats(),
        store: match app.policy().authoritative_store() {
            StoreKind::Local => "local",
            StoreKind::Remote => "remote",
        },
        remote,
    };
    if json {
        return print_json(&report);
    }

    match report.identity {
        Some(identity) => {
            let name = identity.profile_name().unwrap_or_else(|| identity.uid.clone());
            println!("Signed in as {name} ({})", identity.uid);
            println!("{}", level_line(report.points, &report.level));
        }
        None => println!("Guest: data is stored on this device only"),
    }
    if let Some(url) = &report.remote {
        println!("Cloud: {url}");
    }
    let stats = report.stats;
    println!(
        "{} brews, {} recipes, {} shops ({} storage)",
        stats.brews, stats.drinks, stats.shops, report.store
    );
    Ok(())
}

pub(crate) fn cmd_status(app: &App, json: bool) -> Result<()> {
    print_status(app, json)
}

pub(crate) fn cmd_level(app: &App, json: bool) -> Result<()> {
    let points = app.points();
    let level = level_for(points);
    if json {
        return print_json(&serde_json::json!({ "points": points, "level": level }));
    }

    if app.identity().is_none() {
        println!("Guests don't earn points. Sign in with `crema login <uid>` to start climbing.");
    }
    println!("{}", level_line(points, &level));

    #[derive(Tabled)]
    struct TierRow {
        #[tabled(rename = "")]
        current: &'static str,
        #[tabled(rename = "Title")]
        title: &'static str,
        #[tabled(rename = "Points")]
        range: String,
    }

    let rows: Vec<TierRow> = TIERS
        .iter()
        .map(|t| TierRow {
            current: if t.title == level.title { "▶" } else { "" },
            title: t.title,
            range: format!("{}-{}", t.min, t.max),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_leaderboard(app: &App, limit: usize, json: bool) -> Result<()> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        bail!("Limit must be between 1 and {MAX_LIMIT}");
    }
    let entries = app.leaderboard(limit).await;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No one on the leaderboard yet (or the cloud could not be reached)");
        return Ok(());
    }

    #[derive(Tabled)]
    struct LeaderRow {
        #[tabled(rename = "#")]
        rank: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Title")]
        title: &'static str,
        #[tabled(rename = "Points")]
        points: u64,
        #[tabled(rename = "")]
        me: &'static str,
    }

    let rows: Vec<LeaderRow> = entries
        .iter()
        .map(|e| LeaderRow {
            rank: e.rank,
            name: truncate(&e.name, 24),
            title: e.title,
            points: e.points,
            me: if e.is_me { "← you" } else { "" },
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
