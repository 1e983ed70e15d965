use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crema_core::models::{MAX_RATING, NewShop};

use super::App;
use super::helpers::{print_json, resolve_id, reward_note, short_id, stars, truncate};

pub(crate) async fn cmd_shop_add(
    app: &mut App,
    name: &str,
    location: &str,
    rating: Option<u8>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let before = app.points();
    let shop = app
        .create_shop(NewShop {
            shop_name: name.trim().to_string(),
            location: location.to_string(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            rating: rating.unwrap_or(MAX_RATING),
        })
        .await?;

    if json {
        return print_json(&shop);
    }
    println!("Saved shop: {} (id: {})", shop.shop_name, short_id(&shop.id));
    if shop.coordinates().is_none() && !shop.address.is_empty() {
        println!("  No map pin: enter coordinates as \"lat,lng\" to place one");
    }
    println!(
        "{}",
        reward_note(app.identity().is_some(), before, app.points(), &app.level())
    );
    Ok(())
}

pub(crate) fn cmd_shop_list(app: &App, json: bool) -> Result<()> {
    if json {
        return print_json(app.shops());
    }
    if app.shops().is_empty() {
        println!("No shops yet. Add one with: crema shop add <name> --location \"lat,lng\"");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ShopRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Shop")]
        name: String,
        #[tabled(rename = "Where")]
        location: String,
        #[tabled(rename = "Rating")]
        rating: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<ShopRow> = app
        .shops()
        .iter()
        .map(|s| ShopRow {
            id: short_id(&s.id).to_string(),
            name: truncate(&s.shop_name, 30),
            location: truncate(s.display_location(), 30),
            rating: stars(s.rating),
            notes: s.notes.as_deref().map(|n| truncate(n, 40)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_shop_edit(
    app: &mut App,
    id: &str,
    name: Option<String>,
    location: Option<String>,
    rating: Option<u8>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let id = resolve_id(app.shops(), id)?;
    let mut new = app
        .shops()
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.to_new())
        .unwrap_or_default();
    if let Some(name) = name {
        new.shop_name = name.trim().to_string();
    }
    if let Some(location) = location {
        new.location = location;
    }
    if let Some(rating) = rating {
        new.rating = rating;
    }
    if let Some(notes) = notes {
        new.notes = (!notes.trim().is_empty()).then_some(notes);
    }

    let shop = app.update_shop(&id, new).await?;
    if json {
        print_json(&shop)
    } else {
        println!("Updated shop: {} (id: {})", shop.shop_name, short_id(&shop.id));
        Ok(())
    }
}

pub(crate) async fn cmd_shop_delete(app: &mut App, id: &str, json: bool) -> Result<()> {
    let id = resolve_id(app.shops(), id)?;
    let removed = app.delete_shop(&id).await;
    if json {
        println!("{}", serde_json::json!({ "deleted": id, "removed": removed }));
    } else {
        println!("Deleted shop {}", short_id(&id));
    }
    Ok(())
}
