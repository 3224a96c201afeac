//! Canonical data model shared by the sync engine and the read side.
//!
//! Every upstream source is normalized into [`ItemData`]. The document a
//! record serializes to is the contract downstream consumers depend on, so
//! field names and enum codes here must stay stable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Language code used when only a literal (untranslated) value is known.
pub const DEFAULT_LANGUAGE: &str = "EN";

/// Display text keyed by language code (`"EN"`, `"JA"`, ...).
pub type LangMap = BTreeMap<String, String>;

/// A flat field filter over stored documents (`field == value`).
pub type Filter = serde_json::Map<String, Value>;

/// Upstream game a record was synchronized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Genshin,
    StarRail,
    Zzz,
}

impl Game {
    pub const ALL: [Game; 3] = [Game::Genshin, Game::StarRail, Game::Zzz];

    pub fn as_str(&self) -> &'static str {
        match self {
            Game::Genshin => "genshin",
            Game::StarRail => "starrail",
            Game::Zzz => "zzz",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Game {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Game::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown game '{}'. Must be genshin, starrail, or zzz.", s))
    }
}

/// Category discriminator of a canonical record (the document's `type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Avatar,
    NormalItem,
    Monster,
    Weapon,
    Scene,
    Gadget,
    ArtifactMainStat,
    ArtifactSubStat,
    ArtifactConfig,
    Quest,
    MapPlane,
    Stage,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Avatar => "AVATAR",
            ItemType::NormalItem => "NORMAL_ITEM",
            ItemType::Monster => "MONSTER",
            ItemType::Weapon => "WEAPON",
            ItemType::Scene => "SCENE",
            ItemType::Gadget => "GADGET",
            ItemType::ArtifactMainStat => "ARTIFACT_MAIN_STAT",
            ItemType::ArtifactSubStat => "ARTIFACT_SUB_STAT",
            ItemType::ArtifactConfig => "ARTIFACT_CONFIG",
            ItemType::Quest => "QUEST",
            ItemType::MapPlane => "MAP_PLANE",
            ItemType::Stage => "STAGE",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a `#[repr(u8)]` canonical enum that serializes as its integer code.
macro_rules! canonical_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(u8)]
        pub enum $name {
            #[default]
            $($variant = $code),+
        }

        impl $name {
            pub fn code(self) -> u8 {
                self as u8
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(self.code())
            }
        }
    };
}

canonical_enum!(
    /// Weapon class (Genshin), path (Star Rail) or specialty (ZZZ).
    WeaponType {
        Unknown = 0,
        Sword = 1,
        Claymore = 2,
        Polearm = 3,
        Bow = 4,
        Catalyst = 5,
        Destruction = 11,
        Hunt = 12,
        Erudition = 13,
        Harmony = 14,
        Nihility = 15,
        Preservation = 16,
        Abundance = 17,
        Remembrance = 18,
        Attack = 21,
        Stun = 22,
        Anomaly = 23,
        Support = 24,
        Defense = 25,
        Rupture = 26,
    }
);

canonical_enum!(
    /// Damage element across all games.
    Element {
        None = 0,
        Pyro = 1,
        Hydro = 2,
        Anemo = 3,
        Electro = 4,
        Dendro = 5,
        Cryo = 6,
        Geo = 7,
        Physical = 8,
        Quantum = 9,
        Imaginary = 10,
        Ether = 11,
    }
);

canonical_enum!(
    BodyType {
        Unknown = 0,
        Boy = 1,
        Girl = 2,
        Lady = 3,
        Male = 4,
        Loli = 5,
    }
);

canonical_enum!(
    /// Sub-typing of consumable/normal items.
    ItemSubType {
        Other = 0,
        Material = 1,
        Food = 2,
        Furniture = 3,
        Currency = 4,
        Consumable = 5,
        Quest = 6,
        Book = 7,
    }
);

canonical_enum!(
    MonsterKind {
        Ordinary = 0,
        Elite = 1,
        Boss = 2,
        Environment = 3,
    }
);

canonical_enum!(
    SceneKind {
        Other = 0,
        World = 1,
        Dungeon = 2,
        Room = 3,
        HomeWorld = 4,
        Activity = 5,
    }
);

canonical_enum!(
    QuestKind {
        Other = 0,
        Archon = 1,
        Story = 2,
        World = 3,
        Event = 4,
        Daily = 5,
    }
);

canonical_enum!(
    PlaneKind {
        Other = 0,
        Town = 1,
        Maze = 2,
        Train = 3,
        Challenge = 4,
        Raid = 5,
    }
);

canonical_enum!(
    StageMode {
        Other = 0,
        Mainline = 1,
        Challenge = 2,
        Cocoon = 3,
        ShiyuDefense = 11,
        DeadlyAssault = 12,
        HollowZero = 13,
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarDetails {
    pub weapon: WeaponType,
    pub element: Element,
    pub body: BodyType,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalItemDetails {
    pub sub_type: ItemSubType,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterDetails {
    pub monster_kind: MonsterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponDetails {
    pub weapon: WeaponType,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDetails {
    pub scene_kind: SceneKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetDetails {
    pub json_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMainStatDetails {
    pub prop: String,
    pub depot: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSubStatDetails {
    pub prop: String,
    pub depot: i64,
    pub group: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfigDetails {
    pub set_id: i64,
    pub equip_slot: String,
    pub rarity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestDetails {
    pub quest_kind: QuestKind,
    pub chapter: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPlaneDetails {
    pub plane_kind: PlaneKind,
    pub world: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDetails {
    pub stage_mode: StageMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<f64>,
}

/// Category-specific attributes, flattened into the record document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemDetails {
    Avatar(AvatarDetails),
    NormalItem(NormalItemDetails),
    Monster(MonsterDetails),
    Weapon(WeaponDetails),
    Scene(SceneDetails),
    Gadget(GadgetDetails),
    ArtifactMainStat(ArtifactMainStatDetails),
    ArtifactSubStat(ArtifactSubStatDetails),
    ArtifactConfig(ArtifactConfigDetails),
    Quest(QuestDetails),
    MapPlane(MapPlaneDetails),
    Stage(StageDetails),
}

impl ItemDetails {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemDetails::Avatar(_) => ItemType::Avatar,
            ItemDetails::NormalItem(_) => ItemType::NormalItem,
            ItemDetails::Monster(_) => ItemType::Monster,
            ItemDetails::Weapon(_) => ItemType::Weapon,
            ItemDetails::Scene(_) => ItemType::Scene,
            ItemDetails::Gadget(_) => ItemType::Gadget,
            ItemDetails::ArtifactMainStat(_) => ItemType::ArtifactMainStat,
            ItemDetails::ArtifactSubStat(_) => ItemType::ArtifactSubStat,
            ItemDetails::ArtifactConfig(_) => ItemType::ArtifactConfig,
            ItemDetails::Quest(_) => ItemType::Quest,
            ItemDetails::MapPlane(_) => ItemType::MapPlane,
            ItemDetails::Stage(_) => ItemType::Stage,
        }
    }
}

/// A canonical record (the "ItemData" family).
///
/// `id == 0` asks the persistence gateway to allocate the next value of the
/// item id sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemData {
    pub id: i64,
    #[serde(rename = "type")]
    kind: ItemType,
    pub game: Game,
    pub name: LangMap,
    pub desc: LangMap,
    pub desc2: LangMap,
    pub icon: String,
    #[serde(flatten)]
    details: ItemDetails,
}

impl ItemData {
    pub fn new(id: i64, game: Game, details: ItemDetails) -> Self {
        Self {
            id,
            kind: details.item_type(),
            game,
            name: LangMap::new(),
            desc: LangMap::new(),
            desc2: LangMap::new(),
            icon: String::new(),
            details,
        }
    }

    pub fn kind(&self) -> ItemType {
        self.kind
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    /// Serialize to the stored document shape.
    pub fn to_document(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Durable identity of a record: `(id, type, game, extra)`.
///
/// `extra` holds variant-specific document fields that further narrow the
/// identity (for example `{mode, character}` for flattened stage rows).
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityKey {
    pub id: i64,
    pub kind: ItemType,
    pub game: Game,
    pub extra: BTreeMap<String, Value>,
}

impl IdentityKey {
    pub fn new(id: i64, kind: ItemType, game: Game) -> Self {
        Self {
            id,
            kind,
            game,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Canonical JSON of the extra filter; keys are sorted.
    pub fn extra_json(&self) -> String {
        extra_json(&self.extra)
    }

    pub fn to_filter(&self) -> Filter {
        IdentityFilter::from(self).to_filter()
    }
}

/// Lookup form of an identity; `id: None` matches any id.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityFilter {
    pub id: Option<i64>,
    pub kind: ItemType,
    pub game: Game,
    pub extra: BTreeMap<String, Value>,
}

impl IdentityFilter {
    pub fn extra_json(&self) -> String {
        extra_json(&self.extra)
    }

    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(id) = self.id {
            filter.insert("id".to_string(), Value::from(id));
        }
        filter.insert("type".to_string(), Value::from(self.kind.as_str()));
        filter.insert("game".to_string(), Value::from(self.game.as_str()));
        for (k, v) in &self.extra {
            filter.insert(k.clone(), v.clone());
        }
        filter
    }

    /// Whether a stored document matches this filter.
    pub fn matches(&self, doc: &Value) -> bool {
        matches_filter(doc, &self.to_filter())
    }
}

impl From<&IdentityKey> for IdentityFilter {
    fn from(key: &IdentityKey) -> Self {
        Self {
            id: Some(key.id),
            kind: key.kind,
            game: key.game,
            extra: key.extra.clone(),
        }
    }
}

fn extra_json(extra: &BTreeMap<String, Value>) -> String {
    if extra.is_empty() {
        return "{}".to_string();
    }
    serde_json::to_string(extra).unwrap_or_else(|_| "{}".to_string())
}

/// Whether every `field == value` pair of `filter` holds on `doc`.
pub fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// Outcome of a persistence gateway upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// A key/value marker: last-seen revision cache and counter store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
    pub reason: String,
}
