//! Command builders for the OpenPGP card application

use cardvault_apdu::{Command, chain};

use crate::{
    Result,
    constants::{OPENPGP_AID, PSO_DECIPHER, SELECT_BY_NAME, ins, tags},
};

/// SELECT the OpenPGP application by AID
pub fn select_openpgp() -> Command {
    let (p1, p2) = SELECT_BY_NAME;
    Command::new_with_data(0x00, ins::SELECT, p1, p2, OPENPGP_AID)
}

/// GET DATA for the public key URL object
pub const fn get_public_key_url() -> Command {
    let [p1, p2] = tags::PUBLIC_KEY_URL.to_be_bytes();
    Command::new_with_le(0x00, ins::GET_DATA, p1, p2, 0x00)
}

/// VERIFY `pin` against the access condition `reference`
pub fn verify(reference: u8, pin: &[u8]) -> Command {
    Command::new_with_data(0x00, ins::VERIFY, 0x00, reference, pin.to_vec())
}

/// PSO:DECIPHER command chain for `data`
///
/// Every command but the last carries the chaining bit; the last one asks for the
/// full response with `Le = 0x00`.
pub fn decipher_chain(data: &[u8], chunk_size: usize) -> Result<Vec<Command>> {
    let (p1, p2) = PSO_DECIPHER;
    let template = Command::new(0x00, ins::PSO, p1, p2);
    let mut commands = chain(&template, data, chunk_size)?;
    if let Some(last) = commands.pop() {
        commands.push(last.with_le(0x00));
    }
    Ok(commands)
}
