mod account;
mod brew;
mod helpers;
mod recipe;
mod shop;
mod tools;

use crate::remote::CloudStore;
use crema_core::db::Database;
use crema_core::service::CoffeeService;

/// The collection service as wired up by the CLI.
pub(crate) type App = CoffeeService<Database, CloudStore>;

pub(crate) use account::{cmd_leaderboard, cmd_level, cmd_login, cmd_logout, cmd_status};
pub(crate) use brew::{
    BrewAddArgs, BrewEditArgs, cmd_brew_add, cmd_brew_delete, cmd_brew_edit, cmd_brew_favorite,
    cmd_brew_list,
};
pub(crate) use recipe::{cmd_recipe_add, cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_list};
pub(crate) use shop::{cmd_shop_add, cmd_shop_delete, cmd_shop_edit, cmd_shop_list};
pub(crate) use tools::{cmd_dial_in, cmd_yield};
