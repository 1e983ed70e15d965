use anyhow::{Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// --- Collection identity ---

/// The three user collections, each persisted as one JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Brews,
    Drinks,
    Shops,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [Self::Brews, Self::Drinks, Self::Shops];

    /// Field name on the remote user document.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Brews => "brews",
            Self::Drinks => "drinks",
            Self::Shops => "shops",
        }
    }

    /// Fixed key in device-local storage.
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Brews => "coffee_brews",
            Self::Drinks => "coffee_drinks",
            Self::Shops => "coffee_shops",
        }
    }

    /// Points granted when an element of this collection is created.
    #[must_use]
    pub fn creation_points(self) -> u32 {
        match self {
            Self::Brews => 5,
            Self::Drinks => 10,
            Self::Shops => 20,
        }
    }
}

/// An element of one of the three collections.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    const KIND: CollectionKind;

    fn id(&self) -> &str;

    fn items(collections: &Collections) -> &[Self];

    fn items_mut(collections: &mut Collections) -> &mut Vec<Self>;

    /// A remote update that replaces this collection wholesale.
    fn into_update(items: Vec<Self>) -> ProfileUpdate;
}

// --- Brews ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brew {
    pub id: String,
    #[serde(default)]
    pub bean_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roast_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grinder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grind_size: Option<String>,
    #[serde(default)]
    pub dose_in: String,
    #[serde(default)]
    pub ratio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<String>,
    #[serde(default)]
    pub preinfusion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pi_bar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pi_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_bar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_weight: Option<String>,
    #[serde(default)]
    pub tapering: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_bar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_weight: Option<String>,
    #[serde(default)]
    pub date_added: String,
    #[serde(default)]
    pub favorite: bool,
}

/// User-editable brew fields, as submitted from the brew form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBrew {
    pub bean_name: String,
    pub roast_date: Option<String>,
    pub grinder: Option<String>,
    pub grind_size: Option<String>,
    pub dose_in: String,
    pub ratio: String,
    pub temp: Option<String>,
    pub rpm: Option<String>,
    pub preinfusion: bool,
    pub pi_bar: Option<String>,
    pub pi_weight: Option<String>,
    pub peak_bar: Option<String>,
    pub peak_weight: Option<String>,
    pub tapering: bool,
    pub tap_bar: Option<String>,
    pub tap_weight: Option<String>,
}

impl Brew {
    #[must_use]
    pub fn from_new(new: NewBrew, id: String, date_added: String) -> Self {
        let mut brew = Self {
            id,
            bean_name: String::new(),
            roast_date: None,
            grinder: None,
            grind_size: None,
            dose_in: String::new(),
            ratio: String::new(),
            temp: None,
            rpm: None,
            preinfusion: false,
            pi_bar: None,
            pi_weight: None,
            peak_bar: None,
            peak_weight: None,
            tapering: false,
            tap_bar: None,
            tap_weight: None,
            date_added,
            favorite: false,
        };
        brew.apply(new);
        brew
    }

    /// Overwrite the editable fields. `id`, `date_added` and `favorite` are kept.
    pub fn apply(&mut self, new: NewBrew) {
        let NewBrew {
            bean_name,
            roast_date,
            grinder,
            grind_size,
            dose_in,
            ratio,
            temp,
            rpm,
            preinfusion,
            pi_bar,
            pi_weight,
            peak_bar,
            peak_weight,
            tapering,
            tap_bar,
            tap_weight,
        } = new;
        self.bean_name = bean_name;
        self.roast_date = roast_date;
        self.grinder = grinder;
        self.grind_size = grind_size;
        self.dose_in = dose_in;
        self.ratio = ratio;
        self.temp = temp;
        self.rpm = rpm;
        self.preinfusion = preinfusion;
        self.pi_bar = pi_bar;
        self.pi_weight = pi_weight;
        self.peak_bar = peak_bar;
        self.peak_weight = peak_weight;
        self.tapering = tapering;
        self.tap_bar = tap_bar;
        self.tap_weight = tap_weight;
    }

    /// Expected beverage weight in grams, if dose and ratio are both usable.
    #[must_use]
    pub fn target_yield(&self) -> Option<f64> {
        let dose = parse_number(&self.dose_in)?;
        let ratio = parse_number(&self.ratio)?;
        crate::brewing::target_yield(dose, ratio)
    }

    /// The editable fields, as a starting point for an edit.
    #[must_use]
    pub fn to_new(&self) -> NewBrew {
        NewBrew {
            bean_name: self.bean_name.clone(),
            roast_date: self.roast_date.clone(),
            grinder: self.grinder.clone(),
            grind_size: self.grind_size.clone(),
            dose_in: self.dose_in.clone(),
            ratio: self.ratio.clone(),
            temp: self.temp.clone(),
            rpm: self.rpm.clone(),
            preinfusion: self.preinfusion,
            pi_bar: self.pi_bar.clone(),
            pi_weight: self.pi_weight.clone(),
            peak_bar: self.peak_bar.clone(),
            peak_weight: self.peak_weight.clone(),
            tapering: self.tapering,
            tap_bar: self.tap_bar.clone(),
            tap_weight: self.tap_weight.clone(),
        }
    }
}

impl Entity for Brew {
    const KIND: CollectionKind = CollectionKind::Brews;

    fn id(&self) -> &str {
        &self.id
    }

    fn items(collections: &Collections) -> &[Self] {
        &collections.brews
    }

    fn items_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.brews
    }

    fn into_update(items: Vec<Self>) -> ProfileUpdate {
        ProfileUpdate {
            brews: Some(items),
            ..ProfileUpdate::default()
        }
    }
}

// --- Drinks (recipes) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drink {
    pub id: String,
    #[serde(default)]
    pub drink_name: String,
    #[serde(default)]
    pub recipe: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDrink {
    pub drink_name: String,
    pub recipe: String,
}

impl Drink {
    #[must_use]
    pub fn from_new(new: NewDrink, id: String) -> Self {
        Self {
            id,
            drink_name: new.drink_name,
            recipe: new.recipe,
        }
    }

    #[must_use]
    pub fn to_new(&self) -> NewDrink {
        NewDrink {
            drink_name: self.drink_name.clone(),
            recipe: self.recipe.clone(),
        }
    }
}

impl Entity for Drink {
    const KIND: CollectionKind = CollectionKind::Drinks;

    fn id(&self) -> &str {
        &self.id
    }

    fn items(collections: &Collections) -> &[Self] {
        &collections.drinks
    }

    fn items_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.drinks
    }

    fn into_update(items: Vec<Self>) -> ProfileUpdate {
        ProfileUpdate {
            drinks: Some(items),
            ..ProfileUpdate::default()
        }
    }
}

// --- Shops ---

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

fn default_rating() -> u8 {
    MAX_RATING
}

/// Ratings were historically stored as form strings ("4"); accept both shapes.
fn deserialize_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRating {
        Number(u8),
        Text(String),
    }

    match RawRating::deserialize(deserializer)? {
        RawRating::Number(n) => Ok(n),
        RawRating::Text(s) => s
            .trim()
            .parse::<u8>()
            .map_err(|_| serde::de::Error::custom(format!("invalid rating '{s}'"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: String,
    #[serde(default)]
    pub shop_name: String,
    /// `"lat,lng"` when the shop has a map pin, empty otherwise.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default = "default_rating",
        deserialize_with = "deserialize_rating"
    )]
    pub rating: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewShop {
    pub shop_name: String,
    /// Raw user input: coordinates or a free-text address.
    pub location: String,
    pub notes: Option<String>,
    pub rating: u8,
}

impl Default for NewShop {
    fn default() -> Self {
        Self {
            shop_name: String::new(),
            location: String::new(),
            notes: None,
            rating: MAX_RATING,
        }
    }
}

impl Shop {
    #[must_use]
    pub fn from_new(new: NewShop, id: String) -> Self {
        let (location, address) = resolve_location(&new.location);
        Self {
            id,
            shop_name: new.shop_name,
            location,
            address,
            notes: new.notes,
            rating: new.rating,
        }
    }

    /// Map pin for this shop, if `location` holds two numbers.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lng) = self.location.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lng = lng.trim().parse::<f64>().ok()?;
        (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
    }

    /// The editable fields. The location input is the pin if there is one,
    /// else the address.
    #[must_use]
    pub fn to_new(&self) -> NewShop {
        let location = if self.location.is_empty() {
            &self.address
        } else {
            &self.location
        };
        NewShop {
            shop_name: self.shop_name.clone(),
            location: location.clone(),
            notes: self.notes.clone(),
            rating: self.rating,
        }
    }

    /// What to show for the shop's whereabouts.
    #[must_use]
    pub fn display_location(&self) -> &str {
        if self.address.is_empty() {
            &self.location
        } else {
            &self.address
        }
    }
}

impl Entity for Shop {
    const KIND: CollectionKind = CollectionKind::Shops;

    fn id(&self) -> &str {
        &self.id
    }

    fn items(collections: &Collections) -> &[Self] {
        &collections.shops
    }

    fn items_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.shops
    }

    fn into_update(items: Vec<Self>) -> ProfileUpdate {
        ProfileUpdate {
            shops: Some(items),
            ..ProfileUpdate::default()
        }
    }
}

/// Split shop location input into `(location, address)`.
///
/// Coordinates (`"52.52,13.40"`, `"52.52, 13.40"`) become both the pin and the
/// display address. Anything else is kept only as the address, with no pin.
#[must_use]
pub fn resolve_location(input: &str) -> (String, String) {
    let input = input.trim();
    if looks_like_coordinates(input) {
        (input.to_string(), input.to_string())
    } else {
        (String::new(), input.to_string())
    }
}

/// Matches `-?\d+(\.\d+)?,\s*-?\d+(\.\d+)?`.
#[must_use]
pub fn looks_like_coordinates(input: &str) -> bool {
    let Some((lat, lng)) = input.split_once(',') else {
        return false;
    };
    is_plain_decimal(lat) && is_plain_decimal(lng.trim_start())
}

fn is_plain_decimal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (s, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && frac.is_none_or(all_digits)
}

// --- User profile (remote document) ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub brews: Vec<Brew>,
    #[serde(default)]
    pub drinks: Vec<Drink>,
    #[serde(default)]
    pub shops: Vec<Shop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl UserProfile {
    /// True when any of the three collections holds data.
    #[must_use]
    pub fn has_collections(&self) -> bool {
        !self.brews.is_empty() || !self.drinks.is_empty() || !self.shops.is_empty()
    }

    #[must_use]
    pub fn into_collections(self) -> Collections {
        Collections {
            brews: self.brews,
            drinks: self.drinks,
            shops: self.shops,
        }
    }

    /// Name for leaderboards: display name, else the email's local part, else "User".
    #[must_use]
    pub fn public_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

/// Merge-style partial update of a user document. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brews: Option<Vec<Brew>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drinks: Option<Vec<Drink>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shops: Option<Vec<Shop>>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn points(points: u64) -> Self {
        Self {
            points: Some(points),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_none()
            && self.brews.is_none()
            && self.drinks.is_none()
            && self.shops.is_none()
    }

    /// Apply this update to a full profile, field by field.
    pub fn apply_to(self, profile: &mut UserProfile) {
        if let Some(points) = self.points {
            profile.points = points;
        }
        if let Some(brews) = self.brews {
            profile.brews = brews;
        }
        if let Some(drinks) = self.drinks {
            profile.drinks = drinks;
        }
        if let Some(shops) = self.shops {
            profile.shops = shops;
        }
    }
}

// --- In-memory working set ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default)]
    pub brews: Vec<Brew>,
    #[serde(default)]
    pub drinks: Vec<Drink>,
    #[serde(default)]
    pub shops: Vec<Shop>,
}

impl Collections {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brews.is_empty() && self.drinks.is_empty() && self.shops.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            brews: self.brews.len(),
            drinks: self.drinks.len(),
            shops: self.shops.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub brews: usize,
    pub drinks: usize,
    pub shops: usize,
}

// --- Validation ---

/// Parse a numeric form string (`"18"`, `"18.5"`, `" 2 "`). Empty means absent.
#[must_use]
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn validate_new_brew(brew: &NewBrew) -> Result<()> {
    if brew.bean_name.trim().is_empty() {
        bail!("Bean name must not be empty");
    }
    match parse_number(&brew.dose_in) {
        Some(d) if d > 0.0 => {}
        _ => bail!("Dose must be a positive number (got '{}')", brew.dose_in),
    }
    match parse_number(&brew.ratio) {
        Some(r) if r > 0.0 => {}
        _ => bail!("Ratio must be a positive number (got '{}')", brew.ratio),
    }
    Ok(())
}

pub fn validate_new_drink(drink: &NewDrink) -> Result<()> {
    if drink.drink_name.trim().is_empty() {
        bail!("Drink name must not be empty");
    }
    Ok(())
}

pub fn validate_rating(rating: u8) -> Result<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        bail!("Rating must be between {MIN_RATING} and {MAX_RATING} (got {rating})");
    }
    Ok(())
}

pub fn validate_new_shop(shop: &NewShop) -> Result<()> {
    if shop.shop_name.trim().is_empty() {
        bail!("Shop name must not be empty");
    }
    validate_rating(shop.rating)
}
