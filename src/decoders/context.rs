// DANS : src/decoders/context.rs

use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::envelope::{CompiledIx, TransactionEnvelope};
use crate::events::{Event, EventData, EventSource};
use crate::programs::{aggregator_tag, ProgramId, WSOL_MINT};

/// Discriminateur du wrapper d'auto-invocation Anchor (`anchor:event`),
/// préfixé aux payloads d'événements CPI.
pub const ANCHOR_EVENT_CPI_DISCRIMINATOR: [u8; 8] = [228, 69, 165, 46, 81, 203, 154, 29];

// --- ASSEMBLAGE DES ÉVÉNEMENTS ---

/// Contexte d'une invocation de décodeur sur une enveloppe : attribution de
/// source calculée une fois, numérotation des événements en ordre d'émission.
pub struct DecodeContext<'a> {
    envelope: &'a TransactionEnvelope,
    program: ProgramId,
    program_address: Pubkey,
    source: EventSource,
    sequence: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(envelope: &'a TransactionEnvelope, program: ProgramId) -> Self {
        Self {
            envelope,
            program,
            program_address: program.address(),
            source: attribute_source(envelope),
            sequence: 0,
        }
    }

    pub fn envelope(&self) -> &TransactionEnvelope {
        self.envelope
    }

    /// Construit l'événement suivant. La séquence encode l'ordre d'émission
    /// au sein de cette invocation : 0, 1, 2…
    pub fn next_event(&mut self, name: &str, data: EventData) -> Event {
        let event = Event {
            id: Event::event_id(&self.envelope.signature, &self.program_address, self.sequence),
            program: self.program,
            program_address: self.program_address.to_string(),
            name: name.to_string(),
            signature: self.envelope.signature.clone(),
            slot: self.envelope.slot,
            block_time: self.envelope.block_time,
            signer: self
                .envelope
                .fee_payer()
                .map(|key| key.to_string())
                .unwrap_or_default(),
            source: self.source.clone(),
            data,
        };
        self.sequence += 1;
        event
    }

    pub fn emitted(&self) -> usize {
        self.sequence
    }
}

/// Attribution d'agrégateur : premier agrégateur connu rencontré dans l'ordre
/// de la liste de comptes, sinon appel direct.
pub fn attribute_source(envelope: &TransactionEnvelope) -> EventSource {
    for key in &envelope.account_keys {
        if let Some(tag) = aggregator_tag(key) {
            return EventSource::aggregator(tag, key);
        }
    }
    EventSource::direct()
}

// --- ÉVÉNEMENTS ÉMIS DANS LES LOGS ---

/// Extrait les payloads `Program data: <base64>` avec leur programme émetteur.
/// Un programme est "courant" entre son `Program <addr> invoke` et le
/// `Program <addr> success` (ou `failed`) correspondant.
pub fn program_data_entries(envelope: &TransactionEnvelope) -> Vec<(Pubkey, Vec<u8>)> {
    let mut stack: Vec<Pubkey> = Vec::new();
    let mut entries = Vec::new();

    for line in &envelope.log_messages {
        if let Some(rest) = line.strip_prefix("Program ") {
            if let Some(payload) = rest.strip_prefix("data: ") {
                if let (Some(current), Ok(bytes)) = (stack.last(), base64::decode(payload)) {
                    entries.push((*current, bytes));
                }
                continue;
            }
            let mut parts = rest.split_whitespace();
            let address = parts.next();
            let verb = parts.next();
            let parsed = address.and_then(|a| a.parse::<Pubkey>().ok());
            match (parsed, verb) {
                (Some(address), Some("invoke")) => stack.push(address),
                (Some(_), Some("success")) | (Some(_), Some("failed")) => {
                    stack.pop();
                }
                _ => {}
            }
        }
    }
    entries
}

// --- ÉVÉNEMENTS ÉMIS PAR AUTO-INVOCATION (CPI) ---

/// Itère les données brutes de toutes les instructions internes d'au moins
/// `min_len` octets. Le décodeur ne filtre PAS sur l'index de programme
/// déclaré : l'auto-invocation peut arriver sous un autre index de compte,
/// c'est le discriminateur qui fait foi.
pub fn inner_instruction_payloads(envelope: &TransactionEnvelope, min_len: usize) -> Vec<&[u8]> {
    envelope
        .inner_instructions
        .iter()
        .flat_map(|group| group.instructions.iter())
        .filter(|ix| ix.data.len() >= min_len)
        .map(|ix| ix.data.as_slice())
        .collect()
}

/// Tente le décodage d'un payload CPI : d'abord tel quel, puis après retrait
/// des 8 premiers octets (préfixe wrapper émis par certains programmes).
/// `decode` ne doit accepter qu'un discriminateur de la table d'événements du
/// programme, ce qui borne le risque de faux positif du second essai.
pub fn decode_cpi_payload<F>(data: &[u8], decode: F) -> Option<(String, EventData)>
where
    F: Fn(&[u8; 8], &[u8]) -> Option<(String, EventData)>,
{
    if data.len() < 16 {
        return None;
    }
    let discriminator: [u8; 8] = data[..8].try_into().ok()?;
    if let Some(decoded) = decode(&discriminator, &data[8..]) {
        return Some(decoded);
    }
    // Essai après retrait du wrapper. Il faut encore au moins un
    // discriminateur complet derrière.
    if data.len() < 24 && discriminator != ANCHOR_EVENT_CPI_DISCRIMINATOR {
        return None;
    }
    let stripped = &data[8..];
    if stripped.len() < 8 {
        return None;
    }
    let inner: [u8; 8] = stripped[..8].try_into().ok()?;
    decode(&inner, &stripped[8..])
}

// --- ENRICHISSEMENT ---

/// Aplatit au premier niveau les objets imbriqués de `data` : chaque champ de
/// `swap_result` (par exemple) est recopié en clé de premier niveau, sans
/// écraser les clés existantes. La forme imbriquée est conservée.
pub fn flatten_first_level(data: &mut EventData) {
    let mut flattened: Vec<(String, Value)> = Vec::new();
    for value in data.values() {
        if let Value::Object(nested) = value {
            for (key, nested_value) in nested {
                flattened.push((key.clone(), nested_value.clone()));
            }
        }
    }
    for (key, value) in flattened {
        data.entry(key).or_insert(value);
    }
}

/// Déduit l'identité du token depuis les soldes post-transaction :
/// l'unique mint non natif devient `token_mint`; le mint WSOL devient
/// `quote_mint` quand il est présent, sinon le deuxième mint non natif.
pub fn infer_token_mints(envelope: &TransactionEnvelope) -> (Option<String>, Option<String>) {
    let wsol = WSOL_MINT.to_string();
    let mut non_native: Vec<&str> = Vec::new();
    let mut saw_wsol = false;

    for balance in &envelope.post_token_balances {
        if balance.mint.is_empty() {
            continue;
        }
        if balance.mint == wsol {
            saw_wsol = true;
        } else if !non_native.iter().any(|m| *m == balance.mint) {
            non_native.push(&balance.mint);
        }
    }

    let token_mint = non_native.first().map(|m| m.to_string());
    let quote_mint = if saw_wsol {
        Some(wsol)
    } else {
        non_native.get(1).map(|m| m.to_string())
    };
    (token_mint, quote_mint)
}

/// Première instruction de premier niveau dont le programme résolu est
/// `program` : l'instruction "principale" de la transaction pour ce décodeur.
pub fn primary_instruction<'a>(
    envelope: &'a TransactionEnvelope,
    program: &Pubkey,
) -> Option<&'a CompiledIx> {
    envelope
        .instructions
        .iter()
        .find(|ix| envelope.program_of(ix) == Some(program))
}

/// Recopie dans `data` les comptes nommés de l'instruction selon la table de
/// rôles `(index, nom)` de l'événement. Les index hors limite sont ignorés
/// silencieusement; les clés déjà présentes ne sont pas écrasées.
pub fn map_instruction_accounts(
    envelope: &TransactionEnvelope,
    ix: &CompiledIx,
    roles: &[(usize, &str)],
    data: &mut EventData,
) {
    for (position, role) in roles {
        let Some(account_index) = ix.accounts.get(*position) else {
            continue;
        };
        let Some(key) = envelope.account_at(*account_index as usize) else {
            debug!("[Decoders] Index de compte {} hors limites", account_index);
            continue;
        };
        data.entry(role.to_string())
            .or_insert_with(|| Value::String(key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::TokenBalance;
    use crate::events::SourceType;
    use crate::programs::{JUPITER_V6_PROGRAM_ID, PUMP_FUN_PROGRAM_ID, PUMP_AMM_PROGRAM_ID};

    #[test]
    fn log_tracking_attributes_payload_to_current_program() {
        let envelope = TransactionEnvelope {
            log_messages: vec![
                format!("Program {} invoke [1]", PUMP_AMM_PROGRAM_ID),
                format!("Program {} invoke [2]", PUMP_FUN_PROGRAM_ID),
                format!("Program data: {}", base64::encode([1u8, 2, 3])),
                format!("Program {} success", PUMP_FUN_PROGRAM_ID),
                format!("Program data: {}", base64::encode([4u8])),
                format!("Program {} success", PUMP_AMM_PROGRAM_ID),
            ],
            ..Default::default()
        };
        let entries = program_data_entries(&envelope);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (PUMP_FUN_PROGRAM_ID, vec![1, 2, 3]));
        assert_eq!(entries[1], (PUMP_AMM_PROGRAM_ID, vec![4]));
    }

    #[test]
    fn source_attribution_first_match_wins() {
        let envelope = TransactionEnvelope {
            account_keys: vec![PUMP_FUN_PROGRAM_ID, JUPITER_V6_PROGRAM_ID],
            ..Default::default()
        };
        let source = attribute_source(&envelope);
        assert_eq!(source.source_type, SourceType::Jupiter);
        assert_eq!(source.outer_program, Some(JUPITER_V6_PROGRAM_ID.to_string()));

        let direct = attribute_source(&TransactionEnvelope::default());
        assert_eq!(direct.source_type, SourceType::Direct);
        assert!(direct.outer_program.is_none());
    }

    #[test]
    fn mint_inference_prefers_wsol_as_quote() {
        let balance = |mint: &Pubkey| TokenBalance {
            mint: mint.to_string(),
            ..Default::default()
        };
        let envelope = TransactionEnvelope {
            post_token_balances: vec![balance(&PUMP_FUN_PROGRAM_ID), balance(&WSOL_MINT)],
            ..Default::default()
        };
        let (token, quote) = infer_token_mints(&envelope);
        assert_eq!(token, Some(PUMP_FUN_PROGRAM_ID.to_string()));
        assert_eq!(quote, Some(WSOL_MINT.to_string()));
    }

    #[test]
    fn flatten_keeps_nested_form_and_skips_existing_keys() {
        let mut data = EventData::new();
        data.insert("amount_in".to_string(), Value::String("1".into()));
        let mut nested = EventData::new();
        nested.insert("output_amount".to_string(), Value::String("2".into()));
        nested.insert("amount_in".to_string(), Value::String("99".into()));
        data.insert("swap_result".to_string(), Value::Object(nested));

        flatten_first_level(&mut data);

        assert_eq!(data["output_amount"], Value::String("2".into()));
        // La clé déjà présente n'est pas écrasée par l'aplatissement.
        assert_eq!(data["amount_in"], Value::String("1".into()));
        assert!(data["swap_result"].is_object());
    }
}
