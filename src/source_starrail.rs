//! Honkai: Star Rail source: the `ExcelOutput` git data dump.
//!
//! Text references are `{"Hash": n}` objects into
//! `TextMap/TextMap<LANG>.json`. Rarities are spelled out as strings and
//! differ per table, hence one rarity lookup per family.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use gamedata_sync_core::models::{
    AvatarDetails, BodyType, Element, Game, ItemData, ItemDetails, ItemSubType, MapPlaneDetails,
    MonsterDetails, MonsterKind, NormalItemDetails, PlaneKind, StageDetails, StageMode,
    WeaponDetails, WeaponType,
};

use crate::config::GitSourceConfig;
use crate::revision::{GitRemoteProbe, RevisionProbe};
use crate::tables::{SourceTables, TableSpec};
use crate::textmap::TextId;
use crate::traits::{icon_stem, lookup, parse_rows, GameSource, NormalizeReport, SyncContext};

const AVATARS: &str = "ExcelOutput/AvatarConfig.json";
const LIGHT_CONES: &str = "ExcelOutput/EquipmentConfig.json";
const ITEMS: &str = "ExcelOutput/ItemConfig.json";
const MONSTERS: &str = "ExcelOutput/MonsterConfig.json";
const PLANES: &str = "ExcelOutput/MazePlane.json";
const STAGES: &str = "ExcelOutput/StageConfig.json";
const TEXT_MAPS: &str = "TextMap/TextMap{lang}.json";

pub(crate) const DAMAGE_TYPES: &[(&str, Element)] = &[
    ("Physical", Element::Physical),
    ("Fire", Element::Pyro),
    ("Ice", Element::Cryo),
    ("Thunder", Element::Electro),
    ("Wind", Element::Anemo),
    ("Quantum", Element::Quantum),
    ("Imaginary", Element::Imaginary),
];

/// Avatar base type → path.
pub(crate) const PATHS: &[(&str, WeaponType)] = &[
    ("Warrior", WeaponType::Destruction),
    ("Rogue", WeaponType::Hunt),
    ("Mage", WeaponType::Erudition),
    ("Shaman", WeaponType::Harmony),
    ("Warlock", WeaponType::Nihility),
    ("Knight", WeaponType::Preservation),
    ("Priest", WeaponType::Abundance),
    ("Memory", WeaponType::Remembrance),
];

pub(crate) const AVATAR_RARITIES: &[(&str, u8)] = &[
    ("CombatPowerAvatarRarityType4", 4),
    ("CombatPowerAvatarRarityType5", 5),
];

pub(crate) const LIGHT_CONE_RARITIES: &[(&str, u8)] = &[
    ("CombatPowerLightconeRarity3", 3),
    ("CombatPowerLightconeRarity4", 4),
    ("CombatPowerLightconeRarity5", 5),
];

pub(crate) const ITEM_RARITIES: &[(&str, u8)] = &[
    ("Normal", 1),
    ("NotNormal", 2),
    ("Rare", 3),
    ("VeryRare", 4),
    ("SuperRare", 5),
];

pub(crate) const ITEM_SUB_TYPES: &[(&str, ItemSubType)] = &[
    ("Food", ItemSubType::Food),
    ("Book", ItemSubType::Book),
    ("Mission", ItemSubType::Quest),
    ("Virtual", ItemSubType::Currency),
    ("Material", ItemSubType::Material),
    ("Formula", ItemSubType::Material),
    ("Gift", ItemSubType::Consumable),
    ("ForceOpitonalGift", ItemSubType::Consumable),
];

/// Consulted when the sub type is not specific enough.
pub(crate) const ITEM_MAIN_TYPES: &[(&str, ItemSubType)] = &[
    ("Virtual", ItemSubType::Currency),
    ("Material", ItemSubType::Material),
    ("Usable", ItemSubType::Consumable),
    ("Mission", ItemSubType::Quest),
];

pub(crate) const MONSTER_RANKS: &[(&str, MonsterKind)] = &[
    ("Minion", MonsterKind::Ordinary),
    ("Elite", MonsterKind::Elite),
    ("LittleBoss", MonsterKind::Boss),
    ("BigBoss", MonsterKind::Boss),
];

pub(crate) const PLANE_TYPES: &[(&str, PlaneKind)] = &[
    ("Town", PlaneKind::Town),
    ("Maze", PlaneKind::Maze),
    ("Train", PlaneKind::Train),
    ("Challenge", PlaneKind::Challenge),
    ("Raid", PlaneKind::Raid),
];

pub(crate) const STAGE_TYPES: &[(&str, StageMode)] = &[
    ("Mainline", StageMode::Mainline),
    ("Challenge", StageMode::Challenge),
    ("Cocoon", StageMode::Cocoon),
];

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct AvatarRow {
    #[serde(rename = "AvatarID")]
    avatar_id: i64,
    avatar_name: TextId,
    avatar_desc: TextId,
    damage_type: String,
    avatar_base_type: String,
    rarity: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct LightConeRow {
    #[serde(rename = "EquipmentID")]
    equipment_id: i64,
    equipment_name: TextId,
    avatar_base_type: String,
    rarity: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct ItemRow {
    #[serde(rename = "ID")]
    id: i64,
    item_name: TextId,
    item_desc: TextId,
    #[serde(rename = "ItemBGDesc")]
    item_bg_desc: TextId,
    item_main_type: String,
    item_sub_type: String,
    rarity: String,
    item_icon_path: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct MonsterRow {
    #[serde(rename = "MonsterID")]
    monster_id: i64,
    monster_name: TextId,
    monster_introduction: TextId,
    rank: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct PlaneRow {
    #[serde(rename = "PlaneID")]
    plane_id: i64,
    plane_name: TextId,
    plane_type: String,
    #[serde(rename = "WorldID")]
    world_id: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct StageRow {
    #[serde(rename = "StageID")]
    stage_id: i64,
    stage_name: TextId,
    stage_type: String,
    level: Option<i64>,
}

pub struct StarRailSource {
    config: GitSourceConfig,
    languages: Vec<String>,
    probe: GitRemoteProbe,
}

impl StarRailSource {
    pub fn new(config: GitSourceConfig, languages: Vec<String>) -> Self {
        let probe = GitRemoteProbe::new(config.repo.clone(), config.branch.clone());
        Self {
            config,
            languages,
            probe,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe = self.probe.with_timeout(timeout);
        self
    }
}

#[async_trait]
impl GameSource for StarRailSource {
    fn game(&self) -> Game {
        Game::StarRail
    }

    fn description(&self) -> String {
        format!("Honkai: Star Rail data dump ({}#{})", self.config.repo, self.config.branch)
    }

    fn probe(&self) -> &dyn RevisionProbe {
        &self.probe
    }

    fn base_url(&self) -> &str {
        &self.config.raw_base
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn text_folder(&self) -> Option<&str> {
        Some("TextMap")
    }

    fn nickname(&self) -> Option<&str> {
        self.config.nickname.as_deref()
    }

    fn table_specs(&self) -> Vec<TableSpec> {
        vec![
            TableSpec::download(TEXT_MAPS).per_language(),
            TableSpec::table(AVATARS, "AvatarID"),
            TableSpec::table(LIGHT_CONES, "EquipmentID"),
            TableSpec::table(ITEMS, "ID").keep(&[
                "ItemName",
                "ItemDesc",
                "ItemBGDesc",
                "ItemMainType",
                "ItemSubType",
                "Rarity",
                "ItemIconPath",
            ]),
            TableSpec::table(MONSTERS, "MonsterID").keep(&["MonsterName", "MonsterIntroduction", "Rank"]),
            TableSpec::table(PLANES, "PlaneID"),
            TableSpec::table(STAGES, "StageID").keep(&["StageName", "StageType", "Level"]),
        ]
    }

    async fn normalize(&self, tables: &SourceTables, ctx: &mut SyncContext<'_>) -> Result<NormalizeReport> {
        let mut report = NormalizeReport::default();
        let none = BTreeMap::<String, Value>::new();

        if let Some(table) = report.require(tables, AVATARS) {
            let rows: Vec<(String, AvatarRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.avatar_id,
                    Game::StarRail,
                    ItemDetails::Avatar(AvatarDetails {
                        weapon: lookup(PATHS, &row.avatar_base_type, WeaponType::Unknown),
                        element: lookup(DAMAGE_TYPES, &row.damage_type, Element::None),
                        body: BodyType::Unknown,
                        rarity: lookup(AVATAR_RARITIES, &row.rarity, 0),
                    }),
                );
                item.name = ctx.text.name(&row.avatar_name, None).await?;
                item.desc = ctx.text.name(&row.avatar_desc, None).await?;
                item.icon = ctx.icon(&row.avatar_id.to_string()).await;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, LIGHT_CONES) {
            let rows: Vec<(String, LightConeRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.equipment_id,
                    Game::StarRail,
                    ItemDetails::Weapon(WeaponDetails {
                        weapon: lookup(PATHS, &row.avatar_base_type, WeaponType::Unknown),
                        rarity: lookup(LIGHT_CONE_RARITIES, &row.rarity, 0),
                    }),
                );
                item.name = ctx.text.name(&row.equipment_name, None).await?;
                item.icon = ctx.icon(&row.equipment_id.to_string()).await;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, ITEMS) {
            let rows: Vec<(String, ItemRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.id,
                    Game::StarRail,
                    ItemDetails::NormalItem(NormalItemDetails {
                        sub_type: item_sub_type(&row.item_main_type, &row.item_sub_type),
                        rarity: lookup(ITEM_RARITIES, &row.rarity, 0),
                    }),
                );
                item.name = ctx.text.name(&row.item_name, None).await?;
                item.desc = ctx.text.name(&row.item_desc, None).await?;
                item.desc2 = ctx.text.name(&row.item_bg_desc, None).await?;
                item.icon = ctx.icon(&icon_stem(&row.item_icon_path)).await;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, MONSTERS) {
            let rows: Vec<(String, MonsterRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.monster_id,
                    Game::StarRail,
                    ItemDetails::Monster(MonsterDetails {
                        monster_kind: lookup(MONSTER_RANKS, &row.rank, MonsterKind::Ordinary),
                    }),
                );
                item.name = ctx.text.name(&row.monster_name, None).await?;
                item.desc = ctx.text.name(&row.monster_introduction, None).await?;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, PLANES) {
            let rows: Vec<(String, PlaneRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.plane_id,
                    Game::StarRail,
                    ItemDetails::MapPlane(MapPlaneDetails {
                        plane_kind: lookup(PLANE_TYPES, &row.plane_type, PlaneKind::Other),
                        world: row.world_id,
                    }),
                );
                item.name = ctx.text.name(&row.plane_name, None).await?;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, STAGES) {
            let rows: Vec<(String, StageRow)> = parse_rows(table, &mut report);
            let total = rows.len();
            for (i, (_, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let mut item = ItemData::new(
                    row.stage_id,
                    Game::StarRail,
                    ItemDetails::Stage(StageDetails {
                        stage_mode: lookup(STAGE_TYPES, &row.stage_type, StageMode::Other),
                        mode: None,
                        character: None,
                        level: row.level,
                        usage: None,
                    }),
                );
                item.name = ctx.text.name(&row.stage_name, None).await?;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        Ok(report)
    }
}

fn item_sub_type(main_type: &str, sub_type: &str) -> ItemSubType {
    match lookup(ITEM_SUB_TYPES, sub_type, ItemSubType::Other) {
        ItemSubType::Other => lookup(ITEM_MAIN_TYPES, main_type, ItemSubType::Other),
        known => known,
    }
}
