//! Zenless Zone Zero source: a community database served over HTTP.
//!
//! Text is inline: every language has its own copy of `character.json`,
//! `weapon.json` and `item.json`, and a record's name in a language is the
//! `name` of the row with the same key in that language's file. Rows may
//! omit `type`; the category is then inferred from the file they came from.
//!
//! `stage.json` is a flattened usage table: one row per mode, one numeric
//! column per character. Each filled cell becomes its own `STAGE` record,
//! identified by `{mode, character}` with an allocated id.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use gamedata_sync_core::models::{
    AvatarDetails, BodyType, Element, Game, ItemData, ItemDetails, ItemSubType, ItemType, LangMap,
    NormalItemDetails, StageDetails, StageMode, WeaponDetails, WeaponType, DEFAULT_LANGUAGE,
};

use crate::config::CommunitySourceConfig;
use crate::revision::{JsonFieldProbe, RevisionProbe};
use crate::tables::{RawTable, SourceTables, TableSpec};
use crate::traits::{lookup, parse_rows, GameSource, NormalizeReport, SyncContext};

const CHARACTERS: &str = "{lang_lower}/character.json";
const WEAPONS: &str = "{lang_lower}/weapon.json";
const ITEMS: &str = "{lang_lower}/item.json";
const STAGES: &str = "stage.json";

const ROW_FIELDS: &[&str] = &[
    "type", "name", "desc", "icon", "rarity", "specialty", "element", "itemType",
];

/// Declared file → category of rows without a `type`.
pub(crate) const FILE_CATEGORIES: &[(&str, Option<ItemType>)] = &[
    (CHARACTERS, Some(ItemType::Avatar)),
    (WEAPONS, Some(ItemType::Weapon)),
    (ITEMS, Some(ItemType::NormalItem)),
];

/// Human-readable `type` → category.
pub(crate) const CATEGORIES: &[(&str, Option<ItemType>)] = &[
    ("Agent", Some(ItemType::Avatar)),
    ("Character", Some(ItemType::Avatar)),
    ("W-Engine", Some(ItemType::Weapon)),
    ("Weapon", Some(ItemType::Weapon)),
    ("Item", Some(ItemType::NormalItem)),
    ("Material", Some(ItemType::NormalItem)),
];

pub(crate) const SPECIALTIES: &[(&str, WeaponType)] = &[
    ("Attack", WeaponType::Attack),
    ("Stun", WeaponType::Stun),
    ("Anomaly", WeaponType::Anomaly),
    ("Support", WeaponType::Support),
    ("Defense", WeaponType::Defense),
    ("Rupture", WeaponType::Rupture),
];

pub(crate) const ELEMENTS: &[(&str, Element)] = &[
    ("Physical", Element::Physical),
    ("Fire", Element::Pyro),
    ("Ice", Element::Cryo),
    ("Frost", Element::Cryo),
    ("Electric", Element::Electro),
    ("Ether", Element::Ether),
];

pub(crate) const ITEM_KINDS: &[(&str, ItemSubType)] = &[
    ("Material", ItemSubType::Material),
    ("Currency", ItemSubType::Currency),
    ("Consumable", ItemSubType::Consumable),
    ("Food", ItemSubType::Food),
    ("Quest", ItemSubType::Quest),
];

/// Letter rank → rarity.
pub(crate) const RANKS: &[(&str, u8)] = &[("S", 4), ("A", 3), ("B", 2)];

pub(crate) const STAGE_MODES: &[(&str, StageMode)] = &[
    ("Shiyu Defense", StageMode::ShiyuDefense),
    ("Deadly Assault", StageMode::DeadlyAssault),
    ("Hollow Zero", StageMode::HollowZero),
];

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Row {
    id: i64,
    #[serde(rename = "type")]
    kind: Option<String>,
    icon: String,
    rarity: Value,
    specialty: String,
    element: String,
    item_type: String,
}

pub struct ZzzSource {
    config: CommunitySourceConfig,
    languages: Vec<String>,
    probe: JsonFieldProbe,
}

impl ZzzSource {
    pub fn new(config: CommunitySourceConfig, languages: Vec<String>, client: reqwest::Client) -> Self {
        let version_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.version_path.trim_start_matches('/')
        );
        let probe = JsonFieldProbe::new(client, version_url, config.version_field.clone());
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

    /// Display text of the row at `key` in every language that has it.
    fn texts(&self, tables: &SourceTables, file: &str, key: &str, field: &str) -> LangMap {
        let mut out = LangMap::new();
        for lang in &self.languages {
            let text = tables
                .get_lang(file, lang)
                .and_then(|t| t.get(key))
                .and_then(|row| row.get(field))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            if let Some(text) = text {
                out.insert(lang.clone(), text.to_string());
            }
        }
        out
    }

    /// The first language whose copy of `file` loaded drives the row list.
    fn master<'t>(&self, tables: &'t SourceTables, file: &str) -> Option<&'t RawTable> {
        self.languages.iter().find_map(|l| tables.get_lang(file, l))
    }
}

#[async_trait]
impl GameSource for ZzzSource {
    fn game(&self) -> Game {
        Game::Zzz
    }

    fn description(&self) -> String {
        format!("Zenless Zone Zero community database ({})", self.config.base_url)
    }

    fn probe(&self) -> &dyn RevisionProbe {
        &self.probe
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn table_specs(&self) -> Vec<TableSpec> {
        vec![
            TableSpec::table(CHARACTERS, "id").per_language().keep(ROW_FIELDS),
            TableSpec::table(WEAPONS, "id").per_language().keep(ROW_FIELDS),
            TableSpec::table(ITEMS, "id").per_language().keep(ROW_FIELDS),
            TableSpec::rows(STAGES),
        ]
    }

    async fn normalize(&self, tables: &SourceTables, ctx: &mut SyncContext<'_>) -> Result<NormalizeReport> {
        let mut report = NormalizeReport::default();
        let none = BTreeMap::<String, Value>::new();

        for (file, _) in FILE_CATEGORIES {
            let Some(master) = self.master(tables, file) else {
                debug!(file, "no language copy loaded");
                report.missing_tables.push(file.to_string());
                continue;
            };
            let rows: Vec<(String, Row)> = parse_rows(master, &mut report);
            let total = rows.len();

            for (i, (key, row)) in rows.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                let Some(details) = details_for(file, &row) else {
                    debug!(file, key = %key, kind = ?row.kind, "unknown category, skipping row");
                    report.invalid += 1;
                    continue;
                };
                let mut item = ItemData::new(row.id, Game::Zzz, details);
                item.name = self.texts(tables, file, &key, "name");
                item.desc = self.texts(tables, file, &key, "desc");
                item.icon = ctx.icon(&row.icon).await;
                ctx.save(&item, &none, &mut report).await?;
            }
        }

        if let Some(table) = report.require(tables, STAGES) {
            let records = stage_records(table);
            let total = records.len();
            for (i, (item, extra)) in records.into_iter().enumerate() {
                ctx.tick(i + 1, total);
                ctx.save(&item, &extra, &mut report).await?;
            }
        }

        Ok(report)
    }
}

fn category(file: &str, kind: Option<&str>) -> Option<ItemType> {
    match kind.filter(|k| !k.is_empty()) {
        Some(kind) => lookup(CATEGORIES, kind, None),
        None => lookup(FILE_CATEGORIES, file, None),
    }
}

fn rarity(value: &Value) -> u8 {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()).unwrap_or(0),
        Value::String(s) => lookup(RANKS, s, 0),
        _ => 0,
    }
}

fn details_for(file: &str, row: &Row) -> Option<ItemDetails> {
    let details = match category(file, row.kind.as_deref())? {
        ItemType::Avatar => ItemDetails::Avatar(AvatarDetails {
            weapon: lookup(SPECIALTIES, &row.specialty, WeaponType::Unknown),
            element: lookup(ELEMENTS, &row.element, Element::None),
            body: BodyType::Unknown,
            rarity: rarity(&row.rarity),
        }),
        ItemType::Weapon => ItemDetails::Weapon(WeaponDetails {
            weapon: lookup(SPECIALTIES, &row.specialty, WeaponType::Unknown),
            rarity: rarity(&row.rarity),
        }),
        ItemType::NormalItem => ItemDetails::NormalItem(NormalItemDetails {
            sub_type: lookup(ITEM_KINDS, &row.item_type, ItemSubType::Other),
            rarity: rarity(&row.rarity),
        }),
        _ => return None,
    };
    Some(details)
}

/// Expand the flattened usage table into one record per (mode, character).
fn stage_records(table: &RawTable) -> Vec<(ItemData, BTreeMap<String, Value>)> {
    let mut out = Vec::new();
    for row in table.values() {
        let Some(fields) = row.as_object() else {
            continue;
        };
        let Some(mode) = fields.get("mode").and_then(Value::as_str) else {
            continue;
        };
        let level = fields.get("level").and_then(Value::as_i64);

        for (column, cell) in fields {
            let Ok(character) = column.parse::<i64>() else {
                continue;
            };
            let Some(usage) = cell.as_f64() else {
                continue;
            };

            let mut item = ItemData::new(
                0,
                Game::Zzz,
                ItemDetails::Stage(StageDetails {
                    stage_mode: lookup(STAGE_MODES, mode, StageMode::Other),
                    mode: Some(mode.to_string()),
                    character: Some(character),
                    level,
                    usage: Some(usage),
                }),
            );
            item.name.insert(DEFAULT_LANGUAGE.to_string(), mode.to_string());

            let mut extra = BTreeMap::new();
            extra.insert("mode".to_string(), Value::from(mode));
            extra.insert("character".to_string(), Value::from(character));
            out.push((item, extra));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_from_type_or_file() {
        assert_eq!(category(CHARACTERS, None), Some(ItemType::Avatar));
        assert_eq!(category(WEAPONS, None), Some(ItemType::Weapon));
        assert_eq!(category(ITEMS, None), Some(ItemType::NormalItem));
        assert_eq!(category("bangboo.json", None), None);

        // An explicit type wins over the file
        assert_eq!(category(ITEMS, Some("W-Engine")), Some(ItemType::Weapon));
        assert_eq!(category(CHARACTERS, Some("Agent")), Some(ItemType::Avatar));
        assert_eq!(category(CHARACTERS, Some("Bangboo")), None);

        // A blank type says nothing
        assert_eq!(category(CHARACTERS, Some("")), Some(ItemType::Avatar));
        assert_eq!(category(WEAPONS, Some("")), Some(ItemType::Weapon));
    }

    #[test]
    fn specialties_and_elements() {
        let codes: Vec<u8> = SPECIALTIES.iter().map(|(_, w)| w.code()).collect();
        assert_eq!(codes, vec![21, 22, 23, 24, 25, 26]);
        assert_eq!(lookup(SPECIALTIES, "Healer", WeaponType::Unknown), WeaponType::Unknown);

        assert_eq!(lookup(ELEMENTS, "Ether", Element::None), Element::Ether);
        assert_eq!(lookup(ELEMENTS, "Frost", Element::None), Element::Cryo);
        assert_eq!(lookup(ELEMENTS, "Electric", Element::None), Element::Electro);
        assert_eq!(lookup(ELEMENTS, "Wind", Element::None), Element::None);
    }

    #[test]
    fn rarity_accepts_ranks_and_numbers() {
        assert_eq!(rarity(&json!("S")), 4);
        assert_eq!(rarity(&json!("A")), 3);
        assert_eq!(rarity(&json!("B")), 2);
        assert_eq!(rarity(&json!("C")), 0);
        assert_eq!(rarity(&json!(3)), 3);
        assert_eq!(rarity(&json!(999)), 0);
        assert_eq!(rarity(&Value::Null), 0);
    }

    #[test]
    fn item_kinds_and_modes() {
        assert_eq!(lookup(ITEM_KINDS, "Currency", ItemSubType::Other), ItemSubType::Currency);
        assert_eq!(lookup(ITEM_KINDS, "Disc", ItemSubType::Other), ItemSubType::Other);
        assert_eq!(lookup(STAGE_MODES, "Deadly Assault", StageMode::Other), StageMode::DeadlyAssault);
        assert_eq!(lookup(STAGE_MODES, "Story", StageMode::Other), StageMode::Other);
    }

    #[test]
    fn details_follow_category() {
        let row: Row = serde_json::from_value(json!({
            "id": 1011, "specialty": "Stun", "element": "Electric", "rarity": "A"
        }))
        .unwrap();
        match details_for(CHARACTERS, &row) {
            Some(ItemDetails::Avatar(a)) => {
                assert_eq!(a.weapon, WeaponType::Stun);
                assert_eq!(a.element, Element::Electro);
                assert_eq!(a.rarity, 3);
            }
            other => panic!("expected avatar details, got {:?}", other),
        }
        let typed: Row = serde_json::from_value(json!({"id": 1, "type": "Bangboo"})).unwrap();
        assert!(details_for(CHARACTERS, &typed).is_none());
    }

    #[test]
    fn stage_table_is_expanded_per_character() {
        let mut table = RawTable::new();
        table.insert(
            "0".into(),
            json!({"mode": "Shiyu Defense", "level": 7, "1011": 0.25, "1021": 0.5, "note": "x"}),
        );
        table.insert("1".into(), json!({"mode": "Deadly Assault", "1011": 0.1, "1031": null}));
        table.insert("2".into(), json!({"level": 3, "1011": 0.9}));

        let records = stage_records(&table);
        assert_eq!(records.len(), 3);

        let (item, extra) = &records[0];
        assert_eq!(item.id, 0);
        assert_eq!(item.kind(), ItemType::Stage);
        assert_eq!(extra["mode"], json!("Shiyu Defense"));
        assert_eq!(extra["character"], json!(1011));
        let doc = item.to_document().unwrap();
        assert_eq!(doc["stageMode"], 11);
        assert_eq!(doc["level"], 7);
        assert_eq!(doc["usage"], 0.25);
        assert_eq!(item.name.get(DEFAULT_LANGUAGE).map(String::as_str), Some("Shiyu Defense"));

        let (item, extra) = &records[2];
        assert_eq!(extra["mode"], json!("Deadly Assault"));
        assert!(item.to_document().unwrap().get("level").is_none());
    }
}
