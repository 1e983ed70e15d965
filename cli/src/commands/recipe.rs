use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use crema_core::models::NewDrink;

use super::App;
use super::helpers::{print_json, resolve_id, reward_note, short_id, truncate};

pub(crate) async fn cmd_recipe_add(app: &mut App, name: &str, recipe: &str, json: bool) -> Result<()> {
    let before = app.points();
    let drink = app
        .create_drink(NewDrink {
            drink_name: name.trim().to_string(),
            recipe: recipe.to_string(),
        })
        .await?;

    if json {
        return print_json(&drink);
    }
    println!("Saved recipe: {} (id: {})", drink.drink_name, short_id(&drink.id));
    println!(
        "{}",
        reward_note(app.identity().is_some(), before, app.points(), &app.level())
    );
    Ok(())
}

pub(crate) fn cmd_recipe_list(app: &App, json: bool) -> Result<()> {
    if json {
        return print_json(app.drinks());
    }
    if app.drinks().is_empty() {
        println!("No recipes yet. Add one with: crema recipe add <name> --recipe \"...\"");
        return Ok(());
    }

    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Drink")]
        name: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
    }

    let rows: Vec<RecipeRow> = app
        .drinks()
        .iter()
        .map(|d| RecipeRow {
            id: short_id(&d.id).to_string(),
            name: truncate(&d.drink_name, 30),
            recipe: truncate(&d.recipe.replace('\n', " / "), 60),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) async fn cmd_recipe_edit(
    app: &mut App,
    id: &str,
    name: Option<String>,
    recipe: Option<String>,
    json: bool,
) -> Result<()> {
    let id = resolve_id(app.drinks(), id)?;
    let mut new = app
        .drinks()
        .iter()
        .find(|d| d.id == id)
        .map(|d| d.to_new())
        .unwrap_or_default();
    if let Some(name) = name {
        new.drink_name = name.trim().to_string();
    }
    if let Some(recipe) = recipe {
        new.recipe = recipe;
    }

    let drink = app.update_drink(&id, new).await?;
    if json {
        print_json(&drink)
    } else {
        println!("Updated recipe: {} (id: {})", drink.drink_name, short_id(&drink.id));
        Ok(())
    }
}

pub(crate) async fn cmd_recipe_delete(app: &mut App, id: &str, json: bool) -> Result<()> {
    let id = resolve_id(app.drinks(), id)?;
    let removed = app.delete_drink(&id).await;
    if json {
        println!("{}", serde_json::json!({ "deleted": id, "removed": removed }));
    } else {
        println!("Deleted recipe {}", short_id(&id));
    }
    Ok(())
}
