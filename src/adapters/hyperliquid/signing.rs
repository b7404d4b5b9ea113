//! Hyperliquid request signing
//!
//! Two EIP-712 flavours:
//! - L1 actions (orders) are msgpack-hashed into a connection id and signed
//!   as a phantom `Agent` under the "Exchange" domain (chain id 1337).
//! - Fund movements (`withdraw3`) are user-signed typed data under the
//!   "HyperliquidSignTransaction" domain with the Arbitrum Sepolia chain id.

use ethers::abi::{encode, Token};
use ethers::core::types::{Address, Signature, H256, U256};
use ethers::core::utils::keccak256;
use ethers::signers::LocalWallet;

use super::wire::{L1Action, SignatureWire, Withdraw3};
use crate::adapters::errors::{VenueError, VenueResult};

const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const AGENT_TYPE: &str = "Agent(string source,bytes32 connectionId)";
const WITHDRAW_TYPE: &str =
    "HyperliquidTransaction:Withdraw(string hyperliquidChain,string destination,string amount,uint64 time)";

/// Chain id of the L1 action domain
const EXCHANGE_CHAIN_ID: u64 = 1337;
/// Chain id user-signed actions are declared under (Arbitrum Sepolia)
pub const SIGNATURE_CHAIN_ID: u64 = 421614;

fn domain_separator(name: &str, version: &str, chain_id: u64) -> [u8; 32] {
    keccak256(encode(&[
        Token::FixedBytes(keccak256(EIP712_DOMAIN_TYPE).to_vec()),
        Token::FixedBytes(keccak256(name).to_vec()),
        Token::FixedBytes(keccak256(version).to_vec()),
        Token::Uint(U256::from(chain_id)),
        Token::Address(Address::zero()),
    ]))
}

fn typed_data_hash(domain: [u8; 32], struct_hash: [u8; 32]) -> H256 {
    let mut data = Vec::with_capacity(66);
    data.push(0x19);
    data.push(0x01);
    data.extend_from_slice(&domain);
    data.extend_from_slice(&struct_hash);
    H256::from(keccak256(&data))
}

fn sign(wallet: &LocalWallet, hash: H256) -> VenueResult<Signature> {
    wallet
        .sign_hash(hash)
        .map_err(|e| VenueError::Signing(format!("EIP-712 signing failed: {}", e)))
}

/// Connection id of an L1 action: keccak(msgpack(action) || nonce_be || 0x00)
pub fn action_hash(action: &L1Action, nonce: u64) -> VenueResult<H256> {
    let mut bytes = rmp_serde::to_vec_named(action)
        .map_err(|e| VenueError::Signing(format!("msgpack encoding failed: {}", e)))?;
    bytes.extend_from_slice(&nonce.to_be_bytes());
    // no vault address
    bytes.push(0);
    Ok(H256::from(keccak256(bytes)))
}

/// Sign an order-type action as the phantom agent
pub fn sign_l1_action(
    wallet: &LocalWallet,
    action: &L1Action,
    nonce: u64,
    is_mainnet: bool,
) -> VenueResult<Signature> {
    let connection_id = action_hash(action, nonce)?;
    let source = if is_mainnet { "a" } else { "b" };
    let struct_hash = keccak256(encode(&[
        Token::FixedBytes(keccak256(AGENT_TYPE).to_vec()),
        Token::FixedBytes(keccak256(source).to_vec()),
        Token::FixedBytes(connection_id.as_bytes().to_vec()),
    ]));
    let domain = domain_separator("Exchange", "1", EXCHANGE_CHAIN_ID);
    sign(wallet, typed_data_hash(domain, struct_hash))
}

/// Sign a withdrawal from the perp venue to Arbitrum
pub fn sign_withdraw(wallet: &LocalWallet, withdraw: &Withdraw3) -> VenueResult<Signature> {
    let struct_hash = keccak256(encode(&[
        Token::FixedBytes(keccak256(WITHDRAW_TYPE).to_vec()),
        Token::FixedBytes(keccak256(&withdraw.hyperliquid_chain).to_vec()),
        Token::FixedBytes(keccak256(&withdraw.destination).to_vec()),
        Token::FixedBytes(keccak256(&withdraw.amount).to_vec()),
        Token::Uint(U256::from(withdraw.time)),
    ]));
    let domain = domain_separator("HyperliquidSignTransaction", "1", SIGNATURE_CHAIN_ID);
    sign(wallet, typed_data_hash(domain, struct_hash))
}

/// `{r, s, v}` form the exchange endpoint expects
pub fn signature_wire(sig: &Signature) -> SignatureWire {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    sig.r.to_big_endian(&mut r);
    sig.s.to_big_endian(&mut s);
    SignatureWire {
        r: format!("0x{}", hex::encode(r)),
        s: format!("0x{}", hex::encode(s)),
        v: sig.v,
    }
}
