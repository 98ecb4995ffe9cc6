//! AES encryption builtins.
//!
//! Keys and initialisation vectors are hex encoded. Only CBC mode is
//! available; other modes fail the call.

use super::{Function, FunctionResult, ID, STRING, Signature, arg_name, arg_str};
use crate::error::FunctionError;
use crate::value::Value;
use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockCipher, BlockEncryptMut, KeyInit, KeyIvInit};

const AES_BLOCK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaddingMode {
    Pkcs7,
    NoPad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Hex,
    Base64,
}

impl Encoding {
    fn decode(self, input: &str) -> Result<Vec<u8>, String> {
        match self {
            Encoding::Hex => hex::decode(input).map_err(|err| err.to_string()),
            Encoding::Base64 => STANDARD.decode(input).map_err(|err| err.to_string()),
        }
    }

    fn encode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Hex => hex::encode(bytes),
            Encoding::Base64 => STANDARD.encode(bytes),
        }
    }
}

fn encrypt_cbc<C>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    padding: PaddingMode,
) -> Result<Vec<u8>, String>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| "invalid key or iv length".to_string())?;
    let mut buffer = plaintext.to_vec();
    buffer.resize(plaintext.len() + AES_BLOCK, 0);
    let written = match padding {
        PaddingMode::Pkcs7 => encryptor.encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len()),
        PaddingMode::NoPad => {
            encryptor.encrypt_padded_mut::<NoPadding>(&mut buffer, plaintext.len())
        }
    }
    .map_err(|_| "plaintext is not a whole number of blocks".to_string())?
    .len();
    buffer.truncate(written);
    Ok(buffer)
}

/// `(cipher, mode, padding, key, iv, plaintext)`, with the plaintext and
/// result in `encoding`.
fn encrypt(name: &str, args: &[Value], encoding: Encoding) -> FunctionResult {
    let fail = |message: String| FunctionError::failed(name, message);
    let padding = match arg_name(args, 2) {
        "pkcs7" => PaddingMode::Pkcs7,
        "nopad" => PaddingMode::NoPad,
        other => return Err(fail(format!("unsupported padding {other:?}"))),
    };
    match arg_name(args, 1) {
        "cbc" => {}
        other => return Err(fail(format!("unsupported mode {other:?}"))),
    }
    let key = hex::decode(arg_str(args, 3)).map_err(|err| fail(format!("invalid key: {err}")))?;
    let iv = hex::decode(arg_str(args, 4)).map_err(|err| fail(format!("invalid iv: {err}")))?;
    let plaintext = encoding
        .decode(arg_str(args, 5))
        .map_err(|err| fail(format!("invalid plaintext: {err}")))?;
    let ciphertext = match arg_name(args, 0) {
        "aes128" => encrypt_cbc::<Aes128>(&key, &iv, &plaintext, padding),
        "aes192" => encrypt_cbc::<Aes192>(&key, &iv, &plaintext, padding),
        "aes256" => encrypt_cbc::<Aes256>(&key, &iv, &plaintext, padding),
        other => return Err(fail(format!("unsupported cipher {other:?}"))),
    }
    .map_err(fail)?;
    Ok(Value::string(encoding.encode(&ciphertext)))
}

pub(super) fn functions() -> Vec<Function> {
    let signature = Signature::fixed(&[ID, ID, ID, STRING, STRING, STRING]);
    vec![
        Function::new("crypto.encrypt_base64", signature, |_, args| {
            encrypt("crypto.encrypt_base64", args, Encoding::Base64)
        }),
        Function::new("crypto.encrypt_hex", signature, |_, args| {
            encrypt("crypto.encrypt_hex", args, Encoding::Hex)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::lookup;
    use crate::function::tests::context;

    const AES128_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
    const AES256_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const IV: &str = "000102030405060708090a0b0c0d0e0f";

    fn call(name: &str, ids: [&str; 3], key: &str, plaintext: &str) -> FunctionResult {
        let args = vec![
            Value::Ident(ids[0].into()),
            Value::Ident(ids[1].into()),
            Value::Ident(ids[2].into()),
            Value::string(key),
            Value::string(IV),
            Value::string(plaintext),
        ];
        lookup(name).unwrap().call(&mut context(), &args)
    }

    #[test]
    fn aes256_cbc_block_matches_reference_vector() {
        let encrypted = call(
            "crypto.encrypt_hex",
            ["aes256", "cbc", "nopad"],
            AES256_KEY,
            "6bc1bee22e409f96e93d7e117393172a",
        )
        .unwrap();
        assert_eq!(encrypted.to_string(), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");

        let encrypted = call(
            "crypto.encrypt_base64",
            ["aes256", "cbc", "nopad"],
            AES256_KEY,
            "a8G+4i5An5bpPX4Rc5MXKg==",
        )
        .unwrap();
        assert_eq!(encrypted.to_string(), "9YxMBNbl8bp3nqv7X3v71g==");
    }

    #[test]
    fn pkcs7_pads_short_plaintext() {
        let encrypted = call(
            "crypto.encrypt_base64",
            ["aes128", "cbc", "pkcs7"],
            AES128_KEY,
            "aGVsbG8=",
        )
        .unwrap();
        assert_eq!(encrypted.to_string(), "2GZuqKrWXMCDVLS8Q9T/Vg==");
    }

    #[test]
    fn unsupported_parameters_fail() {
        assert!(call("crypto.encrypt_base64", ["aes128", "cbc", "nopad"], AES128_KEY, "aGVsbG8=").is_err());
        assert!(call("crypto.encrypt_base64", ["aes128", "gcm", "pkcs7"], AES128_KEY, "aGVsbG8=").is_err());
        assert!(call("crypto.encrypt_base64", ["des", "cbc", "pkcs7"], AES128_KEY, "aGVsbG8=").is_err());
        assert!(call("crypto.encrypt_base64", ["aes256", "cbc", "pkcs7"], AES128_KEY, "aGVsbG8=").is_err());
    }
}
