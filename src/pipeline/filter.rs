// DANS : src/pipeline/filter.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::events::{Event, EventData};
use crate::programs::LAMPORTS_PER_SOL;

// --- LISTES DE RÔLES FIXES ---
// Les deux graphies (snake_case et camelCase) sont reconnues.

const MINT_FIELDS: &[&str] = &[
    "mint", "token_mint", "base_mint", "quote_mint", "input_mint", "output_mint",
    "tokenMint", "baseMint", "quoteMint", "inputMint", "outputMint",
];

const WALLET_FIELDS: &[&str] = &["user", "creator", "trader", "owner", "authority", "from"];

/// Ordre de sondage des montants SOL (lamports) puis token.
const SOL_AMOUNT_FIELDS: &[&str] = &[
    "sol_amount", "quote_amount_in", "quote_amount_out", "user_quote_amount_in",
    "user_quote_amount_out", "amount_in",
];
const TOKEN_AMOUNT_FIELDS: &[&str] = &[
    "token_amount", "base_amount_out", "base_amount_in", "amount_out", "output_amount",
];

/// Champs dont la valeur est un compte, pour `accounts.include/exclude`.
const ACCOUNT_FIELDS: &[&str] = &[
    "mint", "token_mint", "base_mint", "quote_mint", "input_mint", "output_mint",
    "user", "creator", "trader", "owner", "authority", "from", "to",
    "pool", "pool_id", "pool_state", "bonding_curve", "virtual_pool",
    "config", "global", "global_config", "platform_config", "fee_recipient",
    "protocol_fee_recipient", "payer", "pool_authority", "base_vault", "quote_vault",
    "coin_creator", "lp_mint", "migration_metadata",
];

// --- STRUCTURE DU FILTRE ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filter {
    /// Composition logique : ET des filtres enfants.
    #[serde(rename = "$and", skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Filter>>,
    /// Composition logique : OU des filtres enfants.
    #[serde(rename = "$or", skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Filter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_buy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sol_amount: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_amount: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<AccountsFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

/// Triplet de condition explicite. L'opérateur reste une chaîne : un
/// opérateur inconnu est journalisé et évalue à faux, il n'invalide pas
/// la désérialisation du pipeline entier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: String,
    pub value: Value,
}

impl Filter {
    fn is_empty(&self) -> bool {
        self.and.is_none()
            && self.or.is_none()
            && self.instructions.is_none()
            && self.mints.is_none()
            && self.wallets.is_none()
            && self.is_buy.is_none()
            && self.sol_amount.is_none()
            && self.token_amount.is_none()
            && self.accounts.is_none()
            && self.conditions.is_none()
    }

    /// Évaluation pure et sans effet de bord du filtre contre un événement.
    pub fn evaluate(&self, event: &Event) -> bool {
        // 1. Un filtre vide accepte tout.
        if self.is_empty() {
            return true;
        }

        // 2./3. Composition logique : court-circuit sur le premier verdict.
        if let Some(children) = &self.and {
            if !children.is_empty() {
                return children.iter().all(|child| child.evaluate(event));
            }
        }
        if let Some(children) = &self.or {
            if !children.is_empty() {
                return children.iter().any(|child| child.evaluate(event));
            }
        }

        // 4. Liste blanche de noms d'événements.
        if let Some(instructions) = &self.instructions {
            if !instructions.iter().any(|name| name == &event.name) {
                return false;
            }
        }

        // 5. Mints : au moins une correspondance parmi les champs de rôle mint.
        if let Some(mints) = &self.mints {
            let candidates = collect_field_strings(&event.data, MINT_FIELDS);
            if !mints.iter().any(|mint| candidates.iter().any(|c| c == mint)) {
                return false;
            }
        }

        // 6. Wallets : signer + champs d'acteur.
        if let Some(wallets) = &self.wallets {
            let mut candidates = collect_field_strings(&event.data, WALLET_FIELDS);
            candidates.push(event.signer.clone());
            if !wallets.iter().any(|w| candidates.iter().any(|c| c == w)) {
                return false;
            }
        }

        // 7. Direction. Indérivable => le prédicat ne rejette pas.
        if let Some(expected) = self.is_buy {
            if let Some(actual) = derive_is_buy(event) {
                if actual != expected {
                    return false;
                }
            }
        }

        // 8. Bornes numériques, même règle de saut.
        if let Some(range) = &self.sol_amount {
            if let Some(amount) = derive_sol_amount(&event.data) {
                if !range.contains(amount) {
                    return false;
                }
            }
        }
        if let Some(range) = &self.token_amount {
            if let Some(amount) = derive_token_amount(&event.data) {
                if !range.contains(amount) {
                    return false;
                }
            }
        }

        // 9. Contraintes de comptes.
        if let Some(accounts) = &self.accounts {
            let present = collect_accounts(event);
            if let Some(include) = &accounts.include {
                if !include.iter().any(|a| present.iter().any(|p| p == a)) {
                    return false;
                }
            }
            if let Some(exclude) = &accounts.exclude {
                if exclude.iter().any(|a| present.iter().any(|p| p == a)) {
                    return false;
                }
            }
        }

        // 10. Conditions explicites : toutes doivent passer.
        if let Some(conditions) = &self.conditions {
            for condition in conditions {
                if !condition.matches(event) {
                    return false;
                }
            }
        }

        true
    }
}

impl NumericRange {
    fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

impl Condition {
    fn matches(&self, event: &Event) -> bool {
        let actual = event.lookup(&self.field);
        match self.op.as_str() {
            "eq" => values_eq(actual.as_ref(), &self.value),
            "neq" => !values_eq(actual.as_ref(), &self.value),
            "gt" => compare_numbers(actual.as_ref(), &self.value, |a, b| a > b),
            "gte" => compare_numbers(actual.as_ref(), &self.value, |a, b| a >= b),
            "lt" => compare_numbers(actual.as_ref(), &self.value, |a, b| a < b),
            "lte" => compare_numbers(actual.as_ref(), &self.value, |a, b| a <= b),
            "in" => match (&actual, &self.value) {
                (Some(actual), Value::Array(list)) => {
                    list.iter().any(|candidate| values_eq(Some(actual), candidate))
                }
                _ => false,
            },
            "nin" => match (&actual, &self.value) {
                (Some(actual), Value::Array(list)) => {
                    !list.iter().any(|candidate| values_eq(Some(actual), candidate))
                }
                _ => false,
            },
            "contains" => match (actual.as_ref().and_then(plain_string), plain_string(&self.value)) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            other => {
                warn!("[Filter] Opérateur inconnu `{}` sur le champ {}", other, self.field);
                false
            }
        }
    }
}

// --- DÉRIVATIONS ---

/// Direction du trade : `is_buy` explicite, sinon `trade_direction`
/// (0 = achat), sinon inférence depuis le nom de l'événement.
pub fn derive_is_buy(event: &Event) -> Option<bool> {
    if let Some(Value::Bool(is_buy)) = event.data.get("is_buy") {
        return Some(*is_buy);
    }
    if let Some(direction) = event.data.get("trade_direction").and_then(value_as_f64) {
        return Some(direction == 0.0);
    }
    let lowered = event.name.to_lowercase();
    if lowered.contains("buy") {
        Some(true)
    } else if lowered.contains("sell") {
        Some(false)
    } else {
        None
    }
}

/// Montant SOL de l'événement, converti de lamports en SOL.
pub fn derive_sol_amount(data: &EventData) -> Option<f64> {
    SOL_AMOUNT_FIELDS
        .iter()
        .find_map(|field| data.get(*field).and_then(value_as_f64))
        .map(|lamports| lamports / LAMPORTS_PER_SOL)
}

/// Montant token brut de l'événement.
pub fn derive_token_amount(data: &EventData) -> Option<f64> {
    TOKEN_AMOUNT_FIELDS
        .iter()
        .find_map(|field| data.get(*field).and_then(value_as_f64))
}

fn collect_field_strings(data: &EventData, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|field| data.get(*field))
        .filter_map(|value| value.as_str())
        .map(|s| s.to_string())
        .collect()
}

/// Toutes les chaînes de forme compte de l'événement : signer plus tout champ
/// de la liste de rôles, récursivement dans les objets imbriqués. Seules les
/// chaînes d'au moins 32 caractères sont retenues.
fn collect_accounts(event: &Event) -> Vec<String> {
    let mut found = Vec::new();
    if event.signer.len() >= 32 {
        found.push(event.signer.clone());
    }
    collect_accounts_recursive(&event.data, &mut found);
    found
}

fn collect_accounts_recursive(data: &EventData, found: &mut Vec<String>) {
    for (key, value) in data {
        match value {
            Value::String(s) if s.len() >= 32 && ACCOUNT_FIELDS.contains(&key.as_str()) => {
                found.push(s.clone());
            }
            Value::Object(nested) => collect_accounts_recursive(nested, found),
            _ => {}
        }
    }
}

// --- COERCITIONS ---

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn plain_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Égalité avec coercition : les nombres se comparent numériquement, puis
/// en forme stringifiée (`"5"` égale `5`). Null et absent sont égaux.
fn values_eq(actual: Option<&Value>, expected: &Value) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    if actual.is_null() || expected.is_null() {
        return actual.is_null() && expected.is_null();
    }
    if let (Some(a), Some(b)) = (value_as_f64(actual), value_as_f64(expected)) {
        return a == b;
    }
    match (plain_string(actual), plain_string(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn compare_numbers<F>(actual: Option<&Value>, expected: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (actual.and_then(value_as_f64), value_as_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
