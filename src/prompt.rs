// 📝 Generation Requests - Source row → self-describing prompt
// The prompt carries the field vocabulary and normalization rules so the
// generator's answer can be checked mechanically by `normalize`.

use crate::normalize::KeyedEntry;
use crate::scanner::field_values;
use crate::sources::MoveRecord;

/// Few-shot examples per request
pub const MAX_EXAMPLES: usize = 2;

/// Effect-description phrases → effect type fragments they suggest
const EFFECT_KEYWORDS: &[(&[&str], &str)] = &[
    (&["ダメージ", "攻撃"], "damage"),
    (&["状態", "どく", "まひ", "やけど", "ねむり", "こおり"], "status"),
    (&["確率", "%"], "chance"),
    (&["ランク", "上げる", "下げる"], "stage"),
    (&["連続"], "repeat"),
    (&["まもる", "みきり"], "protect"),
    (&["回復"], "damage_ratio"),
    (&["交代"], "switch"),
];

/// Output-shape reference embedded in every request
pub const DSL_REFERENCE: &str = r#"
# Move DSL reference

## Move
{
  id: "move_id",
  name: "Move Name",
  type: "fire" | "water" | "grass" | "normal" | "electric" | "ice" | "fighting" | "poison" | "ground" | "flying" | "psychic" | "bug" | "rock" | "ghost" | "dragon" | "dark" | "steel" | "fairy",
  category: "physical" | "special" | "status",
  pp: number,            // optional
  priority: number,      // optional
  tags: ["contact", "sound", "slicing", ...],
  critRate: number,      // optional
  effects: [/* Effect */]
}

## Effect
{ type: "damage", power: number, accuracy?: number }
{ type: "speed_based_damage", accuracy?: number, thresholds: [{ ratio: number, power: number }], basePower?: number }
{ type: "apply_status", statusId: string, target?: "self"|"target"|"all", duration?: number|{min:number,max:number}|null, chance?: number, data?: object }
{ type: "remove_status", statusId: string, target?: "self"|"target"|"all" }
{ type: "cure_all_status", target?: "self"|"target"|"all" }
{ type: "apply_field_status", statusId: string, duration?: number|null, data?: object }
{ type: "remove_field_status", statusId: string }
{ type: "replace_status", from: string, to: string, duration?: number|null, data?: object, target?: "self"|"target"|"all" }
{ type: "modify_stage", target?: "self"|"target"|"all", stages: { atk?: number, def?: number, spa?: number, spd?: number, spe?: number } }
{ type: "clear_stages", target?: "self"|"target"|"all" }
{ type: "reset_stages", target?: "self"|"target"|"all" }
{ type: "disable_move", moveId: string, target?: "self"|"target"|"all", duration?: number|null }
{ type: "chance", p: number, then: [Effect], else?: [Effect] }
{ type: "repeat", times: number|{min:number,max:number}, effects: [Effect] }
{ type: "conditional", if: Condition, then: [Effect], else?: [Effect] }
{ type: "damage_ratio", ratioMaxHp: number, target?: "self"|"target"|"all" }
{ type: "delay", afterTurns: number, timing?: "turn_start"|"turn_end", effects: [Effect], target?: "self"|"target"|"all" }
{ type: "over_time", timing?: "turn_start"|"turn_end", effects: [Effect], target?: "self"|"target"|"all" }
{ type: "protect" }
{ type: "apply_item", itemId?: string, target?: "self"|"target" }
{ type: "remove_item", target?: "self"|"target" }
{ type: "consume_item", target?: "self"|"target", markBerryConsumed?: boolean }
{ type: "ohko", baseAccuracy?: number, nonMatchingTypeAccuracy?: number, requiredType?: string, levelScaling?: boolean, respectTypeImmunity?: boolean, immuneTypes?: string[] }
{ type: "random_move", pool?: "all"|"self_moves"|"physical"|"special"|"status" }

## Condition
{ type: "target_has_status", statusId: string }
{ type: "user_has_status", statusId: string }
{ type: "user_type", typeId: string }
{ type: "target_has_item" } | { type: "user_has_item" }
{ type: "target_hp_lt", value: number }
{ type: "field_has_status", statusId: string }
{ type: "weather_is_sunny" } | { type: "weather_is_raining" } | { type: "weather_is_hail" } | { type: "weather_is_sandstorm" }

## Status IDs
burn, poison, paralysis, sleep, freeze, confusion, flinch, protect, lock_move, disable_move, delayed_effect, over_time_effect
"#;

const TYPE_NAMES: &[(&str, &str)] = &[
    ("ノーマル", "normal"),
    ("ほのお", "fire"),
    ("みず", "water"),
    ("でんき", "electric"),
    ("くさ", "grass"),
    ("こおり", "ice"),
    ("かくとう", "fighting"),
    ("どく", "poison"),
    ("じめん", "ground"),
    ("ひこう", "flying"),
    ("エスパー", "psychic"),
    ("むし", "bug"),
    ("いわ", "rock"),
    ("ゴースト", "ghost"),
    ("ドラゴン", "dragon"),
    ("あく", "dark"),
    ("はがね", "steel"),
    ("フェアリー", "fairy"),
];

const CATEGORY_NAMES: &[(&str, &str)] = &[
    ("物理", "physical"),
    ("特殊", "special"),
    ("変化", "status"),
];

/// Native type name → canonical type; unknown or blank is `normal`
pub fn canonical_type(native: &str) -> &'static str {
    let native = native.trim();
    TYPE_NAMES
        .iter()
        .find(|(ja, _)| *ja == native)
        .map_or("normal", |(_, en)| *en)
}

/// Native category → canonical category; unknown falls back on power
pub fn canonical_category(native: &str, power: &str) -> &'static str {
    let native = native.trim();
    match CATEGORY_NAMES.iter().find(|(ja, _)| *ja == native) {
        Some((_, en)) => *en,
        None if power.trim() == "-" => "status",
        None => "physical",
    }
}

/// PP only when the cell is a plain integer
pub fn parse_pp(pp: &str) -> Option<u32> {
    let pp = pp.trim();
    if pp.is_empty() || !pp.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    pp.parse().ok()
}

// ============================================================================
// FEW-SHOT EXAMPLES
// ============================================================================

fn effect_keywords(effect: &str) -> Vec<&'static str> {
    EFFECT_KEYWORDS
        .iter()
        .filter(|(phrases, _)| phrases.iter().any(|p| effect.contains(p)))
        .map(|(_, keyword)| *keyword)
        .collect()
}

/// Existing entries whose effect types match keywords in `effect`, in container order
pub fn find_similar_moves<'a>(
    effect: &str,
    existing: &'a [KeyedEntry],
    max_examples: usize,
) -> Vec<&'a KeyedEntry> {
    let keywords = effect_keywords(effect);
    if keywords.is_empty() {
        return Vec::new();
    }

    existing
        .iter()
        .filter(|entry| {
            // Entry fields sit at depth 1, each effect object at depth 2
            field_values(&entry.value, "type", 2)
                .iter()
                .any(|effect_type| keywords.iter().any(|k| effect_type.contains(k)))
        })
        .take(max_examples)
        .collect()
}

fn render_examples(examples: &[&KeyedEntry]) -> String {
    if examples.is_empty() {
        return "（類似技の例なし）".to_string();
    }
    examples
        .iter()
        .map(|e| format!("// {} の例:\n{}: {}", e.key, e.key, e.value))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// REQUEST
// ============================================================================

/// Build the full generation request for one row
///
/// `existing` is the current move container; similar entries become few-shot examples.
pub fn build_move_prompt(record: &MoveRecord, existing: &[KeyedEntry]) -> String {
    let examples = render_examples(&find_similar_moves(&record.effect, existing, MAX_EXAMPLES));
    let name = record.display_name();
    let type_en = canonical_type(&record.move_type);
    let category_en = canonical_category(&record.category, &record.power);
    let pp_field = parse_pp(&record.pp)
        .map(|pp| format!("pp: {}, ", pp))
        .unwrap_or_default();

    format!(
        r#"以下の技をDSL形式（JavaScriptオブジェクトの1エントリ）に変換してください。

技の情報:
- 技名: {name}
- タイプ: {type_ja} -> {type_en}
- 威力: {power}
- 命中率: {accuracy}
- PP: {pp}
- 分類: {category_ja} -> {category_en}
- 接触/非接触: {contact}
- 効果: {effect}

出力形式（キー付きエントリ1つのみ）:
move_id_here: {{ id: "move_id_here", name: "{name}", type: "{type_en}", category: "{category_en}", {pp_field}effects: [ /* ... */ ] }}

参考になる既存の技:
{examples}

ルール:
1. 威力がある技は damage effect を使う
2. 命中率が "-" なら accuracy を書かない
3. 命中率と確率は 0.0〜1.0 に正規化する（85 -> 0.85）
4. 状態異常は apply_status、能力ランク変化は modify_stage、確率発動は chance を使う
5. 連続攻撃は repeat（2〜5回は min/max）、HP回復や割合ダメージは damage_ratio を使う
6. 溜め技は delay、毎ターン効果は over_time を使う
7. 先制/後攻の記述があれば priority を設定する
8. move_id_here は英語の技名の snake_case とし、キーと id を一致させる
9. 外側の {{}} やコードフェンス、説明文は出力しない
10. DSLで表現できない場合は manual: true と manualReason を付け、effects は最小限にする
11. 接触技には tags: ["contact"] を付ける

{reference}
JavaScriptオブジェクトのみを出力してください。"#,
        name = name,
        type_ja = record.move_type,
        type_en = type_en,
        power = record.power,
        accuracy = record.accuracy,
        pp = record.pp,
        category_ja = record.category,
        category_en = category_en,
        contact = record.contact,
        effect = record.effect,
        pp_field = pp_field,
        examples = examples,
        reference = DSL_REFERENCE,
    )
}

// ============================================================================
// TESTS
// ============================================================================
