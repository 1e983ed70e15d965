use anyhow::{Result, bail};
use serde::Serialize;

use crema_core::level::Level;
use crema_core::models::Entity;

/// Characters of an id shown in tables.
pub(crate) const SHORT_ID_LEN: usize = 8;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Find the full id of the element whose id is `query` or starts with it.
pub(crate) fn resolve_id<T: Entity>(items: &[T], query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Id must not be empty");
    }
    if let Some(exact) = items.iter().find(|item| item.id() == query) {
        return Ok(exact.id().to_string());
    }

    let matches: Vec<&str> = items
        .iter()
        .map(|item| item.id())
        .filter(|id| id.starts_with(query))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => bail!("No {} entry with id '{query}'", T::KIND.field()),
        _ => bail!(
            "Id '{query}' matches {} {}; use more characters",
            matches.len(),
            T::KIND.field()
        ),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// `"2024-06-15T08:00:00+00:00"` -> `"2024-06-15"`; anything unparsable as-is.
pub(crate) fn format_date(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map_or_else(|_| rfc3339.to_string(), |dt| dt.format("%Y-%m-%d").to_string())
}

pub(crate) fn stars(rating: u8) -> String {
    "★".repeat(usize::from(rating))
}

/// Progress line shown after earning points.
pub(crate) fn level_line(points: u64, level: &Level) -> String {
    if level.is_max_tier {
        format!("{points} pts, {} (max level)", level.title)
    } else {
        format!(
            "{points} pts, {} ({}%, {} to next level)",
            level.title, level.progress_percent, level.points_to_next
        )
    }
}

/// Note printed after a create: points earned, or a nudge to sign in.
pub(crate) fn reward_note(signed_in: bool, before: u64, after: u64, level: &Level) -> String {
    if !signed_in {
        return "Saved on this device. Sign in with `crema login` to earn points.".to_string();
    }
    if after > before {
        format!("+{} points: {}", after - before, level_line(after, level))
    } else {
        "Saved, but points could not be updated (see log with RUST_LOG=error)".to_string()
    }
}
