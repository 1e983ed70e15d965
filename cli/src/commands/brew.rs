use anyhow::Result;
use clap::Args;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crema_core::models::{Brew, NewBrew};

use super::App;
use super::helpers::{format_date, print_json, resolve_id, reward_note, short_id, truncate};

/// Optional shot details shared by `brew add` and `brew edit`.
///
/// Passing an empty string clears a field.
#[derive(Args, Debug, Default)]
pub(crate) struct BrewFields {
    /// Roast date
    #[arg(long)]
    roast_date: Option<String>,
    /// Grinder model
    #[arg(long)]
    grinder: Option<String>,
    /// Grind setting
    #[arg(long)]
    grind: Option<String>,
    /// Water temperature in °C
    #[arg(long)]
    temp: Option<String>,
    /// Grinder RPM
    #[arg(long)]
    rpm: Option<String>,
    /// Pre-infusion pressure in bar (marks the shot as pre-infused)
    #[arg(long)]
    pi_bar: Option<String>,
    /// Beverage weight in g when pre-infusion ended
    #[arg(long)]
    pi_weight: Option<String>,
    /// Peak pressure in bar
    #[arg(long)]
    peak_bar: Option<String>,
    /// Beverage weight in g when peak pressure ended
    #[arg(long)]
    peak_weight: Option<String>,
    /// Final pressure in bar after tapering (marks the shot as tapered)
    #[arg(long)]
    tap_bar: Option<String>,
    /// Beverage weight in g when tapering started
    #[arg(long)]
    tap_weight: Option<String>,
}

fn set_field(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        *target = (!value.is_empty()).then(|| value.to_string());
    }
}

impl BrewFields {
    fn apply_to(self, new: &mut NewBrew) {
        set_field(&mut new.roast_date, self.roast_date);
        set_field(&mut new.grinder, self.grinder);
        set_field(&mut new.grind_size, self.grind);
        set_field(&mut new.temp, self.temp);
        set_field(&mut new.rpm, self.rpm);
        set_field(&mut new.pi_bar, self.pi_bar);
        set_field(&mut new.pi_weight, self.pi_weight);
        set_field(&mut new.peak_bar, self.peak_bar);
        set_field(&mut new.peak_weight, self.peak_weight);
        set_field(&mut new.tap_bar, self.tap_bar);
        set_field(&mut new.tap_weight, self.tap_weight);
        new.preinfusion |= new.pi_bar.is_some() || new.pi_weight.is_some();
        new.tapering |= new.tap_bar.is_some() || new.tap_weight.is_some();
    }
}

#[derive(Args, Debug)]
pub(crate) struct BrewAddArgs {
    /// Bean name
    bean: String,
    /// Dose in grams
    #[arg(short, long)]
    dose: String,
    /// Brew ratio (e.g. 2 for 1:2)
    #[arg(short, long)]
    ratio: String,
    #[command(flatten)]
    fields: BrewFields,
}

#[derive(Args, Debug)]
pub(crate) struct BrewEditArgs {
    /// Brew id (or a unique prefix)
    id: String,
    /// New bean name
    #[arg(long)]
    bean: Option<String>,
    /// New dose in grams
    #[arg(short, long)]
    dose: Option<String>,
    /// New brew ratio
    #[arg(short, long)]
    ratio: Option<String>,
    #[command(flatten)]
    fields: BrewFields,
    /// Clear pre-infusion details
    #[arg(long)]
    no_preinfusion: bool,
    /// Clear tapering details
    #[arg(long)]
    no_tapering: bool,
}

impl BrewEditArgs {
    fn apply_to(self, new: &mut NewBrew) {
        if let Some(bean) = self.bean {
            new.bean_name = bean;
        }
        if let Some(dose) = self.dose {
            new.dose_in = dose;
        }
        if let Some(ratio) = self.ratio {
            new.ratio = ratio;
        }
        if self.no_preinfusion {
            new.preinfusion = false;
            new.pi_bar = None;
            new.pi_weight = None;
        }
        if self.no_tapering {
            new.tapering = false;
            new.tap_bar = None;
            new.tap_weight = None;
        }
        self.fields.apply_to(new);
    }
}

pub(crate) async fn cmd_brew_add(app: &mut App, args: BrewAddArgs, json: bool) -> Result<()> {
    let mut new = NewBrew {
        bean_name: args.bean,
        dose_in: args.dose,
        ratio: args.ratio,
        ..NewBrew::default()
    };
    args.fields.apply_to(&mut new);

    let before = app.points();
    let brew = app.create_brew(new).await?;

    if json {
        return print_json(&brew);
    }
    println!("Logged brew: {} (id: {})", brew.bean_name, short_id(&brew.id));
    if let Some(target) = brew.target_yield() {
        println!("  Target yield: {target:.1}g");
    }
    println!(
        "{}",
        reward_note(app.identity().is_some(), before, app.points(), &app.level())
    );
    Ok(())
}

pub(crate) fn cmd_brew_list(app: &App, favorites: bool, json: bool) -> Result<()> {
    let brews: Vec<&Brew> = if favorites {
        app.favorites()
    } else {
        app.brews().iter().collect()
    };

    if json {
        return print_json(&brews);
    }
    if brews.is_empty() {
        if favorites {
            println!("No favorite brews yet. Star one with: crema brew favorite <id>");
        } else {
            println!("No brews yet. Log one with: crema brew add <bean> --dose 18 --ratio 2");
        }
        return Ok(());
    }
    print_brew_table(&brews);
    Ok(())
}

pub(crate) async fn cmd_brew_edit(app: &mut App, args: BrewEditArgs, json: bool) -> Result<()> {
    let id = resolve_id(app.brews(), &args.id)?;
    let mut new = app
        .brews()
        .iter()
        .find(|b| b.id == id)
        .map(Brew::to_new)
        .unwrap_or_default();
    args.apply_to(&mut new);

    let brew = app.update_brew(&id, new).await?;
    if json {
        print_json(&brew)
    } else {
        println!("Updated brew: {} (id: {})", brew.bean_name, short_id(&brew.id));
        Ok(())
    }
}

pub(crate) async fn cmd_brew_delete(app: &mut App, id: &str, json: bool) -> Result<()> {
    let id = resolve_id(app.brews(), id)?;
    let removed = app.delete_brew(&id).await;
    if json {
        println!("{}", serde_json::json!({ "deleted": id, "removed": removed }));
    } else {
        println!("Deleted brew {}", short_id(&id));
    }
    Ok(())
}

pub(crate) async fn cmd_brew_favorite(app: &mut App, id: &str, json: bool) -> Result<()> {
    let id = resolve_id(app.brews(), id)?;
    let favorite = app.toggle_favorite(&id).await?;
    if json {
        println!("{}", serde_json::json!({ "id": id, "favorite": favorite }));
    } else if favorite {
        println!("★ Added brew {} to favorites", short_id(&id));
    } else {
        println!("Removed brew {} from favorites", short_id(&id));
    }
    Ok(())
}

fn print_brew_table(brews: &[&Brew]) {
    #[derive(Tabled)]
    struct BrewRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Bean")]
        bean: String,
        #[tabled(rename = "Dose")]
        dose: String,
        #[tabled(rename = "Ratio")]
        ratio: String,
        #[tabled(rename = "Yield")]
        target: String,
        #[tabled(rename = "Grind")]
        grind: String,
        #[tabled(rename = "★")]
        favorite: String,
    }

    let rows: Vec<BrewRow> = brews
        .iter()
        .map(|b| BrewRow {
            id: short_id(&b.id).to_string(),
            date: format_date(&b.date_added),
            bean: truncate(&b.bean_name, 30),
            dose: format!("{}g", b.dose_in),
            ratio: format!("1:{}", b.ratio),
            target: b
                .target_yield()
                .map_or_else(|| "-".to_string(), |y| format!("{y:.1}g")),
            grind: b.grind_size.clone().unwrap_or_else(|| "-".to_string()),
            favorite: if b.favorite { "★".to_string() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
