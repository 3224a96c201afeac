//! Genshin Impact source: the `ExcelBinOutput` git data dump.
//!
//! Display text lives in `TextMap/TextMap<LANG>.json` and is referenced by
//! `*TextMapHash` fields. Avatar elements are not stored on the avatar row;
//! they come from the burst skill of the avatar's skill depot.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use gamedata_sync_core::models::{
    ArtifactConfigDetails, ArtifactMainStatDetails, ArtifactSubStatDetails, AvatarDetails,
    BodyType, Element, GadgetDetails, Game, ItemData, ItemDetails, ItemSubType, MonsterDetails,
    MonsterKind, NormalItemDetails, QuestDetails, QuestKind, SceneDetails, SceneKind,
    WeaponDetails, WeaponType,
};

use crate::config::GitSourceConfig;
use crate::revision::{GitRemoteProbe, RevisionProbe};
use crate::tables::{RawTable, SourceTables, TableSpec};
use crate::textmap::TextId;
use crate::traits::{lookup, parse_rows, GameSource, NormalizeReport, SyncContext};

const AVATARS: &str = "ExcelBinOutput/AvatarExcelConfigData.json";
const SKILL_DEPOTS: &str = "ExcelBinOutput/AvatarSkillDepotExcelConfigData.json";
const SKILLS: &str = "ExcelBinOutput/AvatarSkillExcelConfigData.json";
const MATERIALS: &str = "ExcelBinOutput/MaterialExcelConfigData.json";
const MONSTERS: &str = "ExcelBinOutput/MonsterExcelConfigData.json";
const MONSTER_DESCRIBE: &str = "ExcelBinOutput/MonsterDescribeExcelConfigData.json";
const WEAPONS: &str = "ExcelBinOutput/WeaponExcelConfigData.json";
const SCENES: &str = "ExcelBinOutput/SceneExcelConfigData.json";
const GADGETS: &str = "ExcelBinOutput/GadgetExcelConfigData.json";
const MAIN_PROPS: &str = "ExcelBinOutput/ReliquaryMainPropExcelConfigData.json";
const AFFIXES: &str = "ExcelBinOutput/ReliquaryAffixExcelConfigData.json";
const RELIQUARIES: &str = "ExcelBinOutput/ReliquaryExcelConfigData.json";
const MAIN_QUESTS: &str = "ExcelBinOutput/MainQuestExcelConfigData.json";
const MANUAL_TEXT: &str = "ExcelBinOutput/ManualTextMapConfigData.json";
const TEXT_MAPS: &str = "TextMap/TextMap{lang}.json";

/// Only playable avatars carry this use type.
const FORMAL_AVATAR: &str = "AVATAR_FORMAL";

pub(crate) const WEAPON_TYPES: &[(&str, WeaponType)] = &[
    ("WEAPON_SWORD_ONE_HAND", WeaponType::Sword),
    ("WEAPON_CLAYMORE", WeaponType::Claymore),
    ("WEAPON_POLE", WeaponType::Polearm),
    ("WEAPON_BOW", WeaponType::Bow),
    ("WEAPON_CATALYST", WeaponType::Catalyst),
];

pub(crate) const QUALITIES: &[(&str, u8)] = &[
    ("QUALITY_ORANGE", 5),
    ("QUALITY_ORANGE_SP", 5),
    ("QUALITY_PURPLE", 4),
    ("QUALITY_BLUE", 3),
    ("QUALITY_GREEN", 2),
    ("QUALITY_WHITE", 1),
];

pub(crate) const BODY_TYPES: &[(&str, BodyType)] = &[
    ("BODY_BOY", BodyType::Boy),
    ("BODY_GIRL", BodyType::Girl),
    ("BODY_LADY", BodyType::Lady),
    ("BODY_MALE", BodyType::Male),
    ("BODY_LOLI", BodyType::Loli),
];

/// Burst skill `costElemType` → element.
pub(crate) const ELEMENTS: &[(&str, Element)] = &[
    ("Fire", Element::Pyro),
    ("Water", Element::Hydro),
    ("Wind", Element::Anemo),
    ("Electric", Element::Electro),
    ("Grass", Element::Dendro),
    ("Ice", Element::Cryo),
    ("Rock", Element::Geo),
];

pub(crate) const MATERIAL_TYPES: &[(&str, ItemSubType)] = &[
    ("MATERIAL_AVATAR_MATERIAL", ItemSubType::Material),
    ("MATERIAL_EXCHANGE", ItemSubType::Material),
    ("MATERIAL_WOOD", ItemSubType::Material),
    ("MATERIAL_FISH_BAIT", ItemSubType::Material),
    ("MATERIAL_WEAPON_EXP_STONE", ItemSubType::Material),
    ("MATERIAL_EXP_FRUIT", ItemSubType::Material),
    ("MATERIAL_FOOD", ItemSubType::Food),
    ("MATERIAL_NOTICE_ADD_HP", ItemSubType::Food),
    ("MATERIAL_FURNITURE_FORMULA", ItemSubType::Furniture),
    ("MATERIAL_FURNITURE_SUITE_FORMULA", ItemSubType::Furniture),
    ("MATERIAL_CONSUME", ItemSubType::Consumable),
    ("MATERIAL_WIDGET", ItemSubType::Consumable),
    ("MATERIAL_CHEST", ItemSubType::Consumable),
    ("MATERIAL_QUEST", ItemSubType::Quest),
];

/// Fallback for rows without a `materialType`.
pub(crate) const ITEM_TYPES: &[(&str, ItemSubType)] = &[("ITEM_VIRTUAL", ItemSubType::Currency)];

pub(crate) const MONSTER_TYPES: &[(&str, MonsterKind)] = &[
    ("MONSTER_ORDINARY", MonsterKind::Ordinary),
    ("MONSTER_BOSS", MonsterKind::Boss),
    ("MONSTER_ENV_ANIMAL", MonsterKind::Environment),
    ("MONSTER_FISH", MonsterKind::Environment),
    ("MONSTER_PARTNER", MonsterKind::Environment),
];

/// Refines ordinary monsters.
pub(crate) const SECURITY_LEVELS: &[(&str, MonsterKind)] = &[
    ("ELITE", MonsterKind::Elite),
    ("BOSS", MonsterKind::Boss),
];

pub(crate) const SCENE_TYPES: &[(&str, SceneKind)] = &[
    ("SCENE_WORLD", SceneKind::World),
    ("SCENE_DUNGEON", SceneKind::Dungeon),
    ("SCENE_ROOM", SceneKind::Room),
    ("SCENE_HOME_WORLD", SceneKind::HomeWorld),
    ("SCENE_HOME_ROOM", SceneKind::HomeWorld),
    ("SCENE_ACTIVITY", SceneKind::Activity),
];

pub(crate) const QUEST_TYPES: &[(&str, QuestKind)] = &[
    ("AQ", QuestKind::Archon),
    ("LQ", QuestKind::Story),
    ("WQ", QuestKind::World),
    ("EQ", QuestKind::Event),
    ("DQ", QuestKind::Daily),
];

pub(crate) const EQUIP_SLOTS: &[(&str, &str)] = &[
    ("EQUIP_BRACER", "flower"),
    ("EQUIP_NECKLACE", "plume"),
    ("EQUIP_SHOES", "sands"),
    ("EQUIP_RING", "goblet"),
    ("EQUIP_DRESS", "circlet"),
];

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct AvatarRow {
    id: i64,
    name_text_map_hash: TextId,
    desc_text_map_hash: TextId,
    icon_name: String,
    weapon_type: String,
    quality_type: String,
    body_type: String,
    skill_depot_id: i64,
    use_type: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MaterialRow {
    id: i64,
    name_text_map_hash: TextId,
    desc_text_map_hash: TextId,
    icon: String,
    material_type: String,
    item_type: String,
    rank_level: u8,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MonsterRow {
    id: i64,
    monster_name: String,
    #[serde(rename = "type")]
    kind: String,
    security_level: String,
    describe_id: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct WeaponRow {
    id: i64,
    name_text_map_hash: TextId,
    desc_text_map_hash: TextId,
    icon: String,
    weapon_type: String,
    rank_level: u8,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SceneRow {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    script_data: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct GadgetRow {
    id: i64,
    json_name: String,
    name_text_map_hash: TextId,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MainPropRow {
    id: i64,
    prop_depot_id: i64,
    prop_type: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct AffixRow {
    id: i64,
    depot_id: i64,
    group_id: i64,
    prop_type: String,
    prop_value: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ReliquaryRow {
    id: i64,
    name_text_map_hash: TextId,
    desc_text_map_hash: TextId,
    icon: String,
    equip_type: String,
    rank_level: u8,
    set_id: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MainQuestRow {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    title_text_map_hash: TextId,
    desc_text_map_hash: TextId,
    chapter_id: i64,
}

pub struct GenshinSource {
    config: GitSourceConfig,
    languages: Vec<String>,
    probe: GitRemoteProbe,
}

impl GenshinSource {
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
impl GameSource for GenshinSource {
    fn game(&self) -> Game {
        Game::Genshin
    }

    fn description(&self) -> String {
        format!("Genshin Impact data dump ({}#{})", self.config.repo, self.config.branch)
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
            TableSpec::table(AVATARS, "id"),
            TableSpec::table(SKILL_DEPOTS, "id").keep(&["energySkill"]),
            TableSpec::table(SKILLS, "id").keep(&["costElemType"]),
            TableSpec::table(MATERIALS, "id").keep(&[
                "nameTextMapHash",
                "descTextMapHash",
                "icon",
                "materialType",
                "itemType",
                "rankLevel",
            ]),
            TableSpec::table(MONSTERS, "id").keep(&["monsterName", "type", "securityLevel", "describeId"]),
            TableSpec::table(MONSTER_DESCRIBE, "id").keep(&["nameTextMapHash", "icon"]),
            TableSpec::table(WEAPONS, "id"),
            TableSpec::table(SCENES, "id").keep(&["type", "scriptData"]),
            TableSpec::table(GADGETS, "id").keep(&["jsonName", "nameTextMapHash"]),
            TableSpec::table(MAIN_PROPS, "id"),
            TableSpec::table(AFFIXES, "id"),
            TableSpec::table(RELIQUARIES, "id"),
            TableSpec::table(MAIN_QUESTS, "id"),
            TableSpec::table(MANUAL_TEXT, "textMapId"),
        ]
    }

    async fn normalize(&self, tables: &SourceTables, ctx: &mut SyncContext<'_>) -> Result<NormalizeReport> {
        let mut report = NormalizeReport::default();
        avatars(tables, ctx, &mut report).await?;
        materials(tables, ctx, &mut report).await?;
        monsters(tables, ctx, &mut report).await?;
        weapons(tables, ctx, &mut report).await?;
        scenes(tables, ctx, &mut report).await?;
        gadgets(tables, ctx, &mut report).await?;
        artifact_stats(tables, ctx, &mut report).await?;
        artifacts(tables, ctx, &mut report).await?;
        quests(tables, ctx, &mut report).await?;
        Ok(report)
    }
}

fn no_extra() -> BTreeMap<String, Value> {
    BTreeMap::new()
}

/// Element of an avatar via its skill depot's burst skill.
fn avatar_element(depot_id: i64, depots: Option<&RawTable>, skills: Option<&RawTable>) -> Element {
    let cost = depots
        .and_then(|d| d.get(&depot_id.to_string()))
        .and_then(|depot| depot.get("energySkill"))
        .and_then(Value::as_i64)
        .and_then(|skill| skills?.get(&skill.to_string()))
        .and_then(|skill| skill.get("costElemType"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    lookup(ELEMENTS, cost, Element::None)
}

fn material_sub_type(material_type: &str, item_type: &str) -> ItemSubType {
    match lookup(MATERIAL_TYPES, material_type, ItemSubType::Other) {
        ItemSubType::Other => lookup(ITEM_TYPES, item_type, ItemSubType::Other),
        known => known,
    }
}

fn monster_kind(kind: &str, security_level: &str) -> MonsterKind {
    match lookup(MONSTER_TYPES, kind, MonsterKind::Ordinary) {
        MonsterKind::Ordinary => lookup(SECURITY_LEVELS, security_level, MonsterKind::Ordinary),
        other => other,
    }
}

async fn avatars(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, AVATARS) else {
        return Ok(());
    };
    let depots = tables.get(SKILL_DEPOTS);
    let skills = tables.get(SKILLS);
    let rows: Vec<(String, AvatarRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        if row.use_type != FORMAL_AVATAR {
            continue;
        }
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Avatar(AvatarDetails {
                weapon: lookup(WEAPON_TYPES, &row.weapon_type, WeaponType::Unknown),
                element: avatar_element(row.skill_depot_id, depots, skills),
                body: lookup(BODY_TYPES, &row.body_type, BodyType::Unknown),
                rarity: lookup(QUALITIES, &row.quality_type, 0),
            }),
        );
        item.name = ctx.text.name(&row.name_text_map_hash, None).await?;
        item.desc = ctx.text.name(&row.desc_text_map_hash, None).await?;
        item.icon = ctx.icon(&row.icon_name).await;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn materials(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, MATERIALS) else {
        return Ok(());
    };
    let rows: Vec<(String, MaterialRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::NormalItem(NormalItemDetails {
                sub_type: material_sub_type(&row.material_type, &row.item_type),
                rarity: row.rank_level,
            }),
        );
        item.name = ctx.text.name(&row.name_text_map_hash, None).await?;
        item.desc = ctx.text.name(&row.desc_text_map_hash, None).await?;
        item.icon = ctx.icon(&row.icon).await;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn monsters(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, MONSTERS) else {
        return Ok(());
    };
    let describe = tables.get(MONSTER_DESCRIBE);
    let rows: Vec<(String, MonsterRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let described = describe.and_then(|d| d.get(&row.describe_id.to_string()));
        let name_hash = described
            .and_then(|d| d.get("nameTextMapHash"))
            .and_then(|v| TextId::deserialize(v).ok())
            .unwrap_or_default();
        let icon = described
            .and_then(|d| d.get("icon"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Monster(MonsterDetails {
                monster_kind: monster_kind(&row.kind, &row.security_level),
            }),
        );
        item.name = ctx.text.name(&name_hash, Some(&row.monster_name)).await?;
        item.icon = ctx.icon(icon).await;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn weapons(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, WEAPONS) else {
        return Ok(());
    };
    let rows: Vec<(String, WeaponRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Weapon(WeaponDetails {
                weapon: lookup(WEAPON_TYPES, &row.weapon_type, WeaponType::Unknown),
                rarity: row.rank_level,
            }),
        );
        item.name = ctx.text.name(&row.name_text_map_hash, None).await?;
        item.desc = ctx.text.name(&row.desc_text_map_hash, None).await?;
        item.icon = ctx.icon(&row.icon).await;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn scenes(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, SCENES) else {
        return Ok(());
    };
    let rows: Vec<(String, SceneRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Scene(SceneDetails {
                scene_kind: lookup(SCENE_TYPES, &row.kind, SceneKind::Other),
            }),
        );
        // Scenes have no display text; the script name is the only label
        item.name = ctx.text.name(&TextId::default(), Some(&row.script_data)).await?;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn gadgets(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, GADGETS) else {
        return Ok(());
    };
    let rows: Vec<(String, GadgetRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Gadget(GadgetDetails {
                json_name: row.json_name.clone(),
            }),
        );
        item.name = ctx.text.name(&row.name_text_map_hash, Some(&row.json_name)).await?;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

/// Main and sub stats share their display name, keyed by prop type in the
/// manual text map.
fn manual_text_id(manual: Option<&RawTable>, prop_type: &str) -> TextId {
    manual
        .and_then(|m| m.get(prop_type))
        .and_then(|row| row.get("textMapContentTextMapHash"))
        .and_then(|v| TextId::deserialize(v).ok())
        .unwrap_or_default()
}

async fn artifact_stats(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let manual = tables.get(MANUAL_TEXT);

    if let Some(table) = report.require(tables, MAIN_PROPS) {
        let rows: Vec<(String, MainPropRow)> = parse_rows(table, report);
        let total = rows.len();
        for (i, (_, row)) in rows.into_iter().enumerate() {
            ctx.tick(i + 1, total);
            let mut item = ItemData::new(
                row.id,
                Game::Genshin,
                ItemDetails::ArtifactMainStat(ArtifactMainStatDetails {
                    prop: row.prop_type.clone(),
                    depot: row.prop_depot_id,
                }),
            );
            let text_id = manual_text_id(manual, &row.prop_type);
            item.name = ctx.text.name(&text_id, Some(&row.prop_type)).await?;
            ctx.save(&item, &no_extra(), report).await?;
        }
    }

    if let Some(table) = report.require(tables, AFFIXES) {
        let rows: Vec<(String, AffixRow)> = parse_rows(table, report);
        let total = rows.len();
        for (i, (_, row)) in rows.into_iter().enumerate() {
            ctx.tick(i + 1, total);
            let mut item = ItemData::new(
                row.id,
                Game::Genshin,
                ItemDetails::ArtifactSubStat(ArtifactSubStatDetails {
                    prop: row.prop_type.clone(),
                    depot: row.depot_id,
                    group: row.group_id,
                    value: row.prop_value,
                }),
            );
            let text_id = manual_text_id(manual, &row.prop_type);
            item.name = ctx.text.name(&text_id, Some(&row.prop_type)).await?;

            let mut extra = BTreeMap::new();
            extra.insert("depot".to_string(), Value::from(row.depot_id));
            ctx.save(&item, &extra, report).await?;
        }
    }
    Ok(())
}

async fn artifacts(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, RELIQUARIES) else {
        return Ok(());
    };
    let rows: Vec<(String, ReliquaryRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::ArtifactConfig(ArtifactConfigDetails {
                set_id: row.set_id,
                equip_slot: lookup(EQUIP_SLOTS, &row.equip_type, "unknown").to_string(),
                rarity: row.rank_level,
            }),
        );
        item.name = ctx.text.name(&row.name_text_map_hash, None).await?;
        item.desc = ctx.text.name(&row.desc_text_map_hash, None).await?;
        item.icon = ctx.icon(&row.icon).await;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}

async fn quests(tables: &SourceTables, ctx: &mut SyncContext<'_>, report: &mut NormalizeReport) -> Result<()> {
    let Some(table) = report.require(tables, MAIN_QUESTS) else {
        return Ok(());
    };
    let rows: Vec<(String, MainQuestRow)> = parse_rows(table, report);
    let total = rows.len();

    for (i, (_, row)) in rows.into_iter().enumerate() {
        ctx.tick(i + 1, total);
        let mut item = ItemData::new(
            row.id,
            Game::Genshin,
            ItemDetails::Quest(QuestDetails {
                quest_kind: lookup(QUEST_TYPES, &row.kind, QuestKind::Other),
                chapter: row.chapter_id,
            }),
        );
        item.name = ctx.text.name(&row.title_text_map_hash, None).await?;
        item.desc = ctx.text.name(&row.desc_text_map_hash, None).await?;
        ctx.save(&item, &no_extra(), report).await?;
    }
    Ok(())
}
