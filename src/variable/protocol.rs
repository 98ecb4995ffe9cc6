//! Transport-level pseudo-variables.
//!
//! There is no real TLS terminator or TCP_INFO source behind a local run, so
//! these read as fixed values captured from a representative edge session.
//! None of them are writable.

use super::ScopeVariables;
use crate::context::Context;
use crate::error::InterpreterResult;
use crate::value::Value;
use chrono::TimeDelta;

pub(super) struct ProtocolVariables;

const CIPHERS_LIST: &str = "130213031301C02FC02BC030C02C009EC0270067C028006B00A3009FCCA9CCA8CCAAC0AFC0ADC0A3C09FC05DC061C057C05300A2C0AEC0ACC0A2C09EC05CC060C056C052C024006AC0230040C00AC01400390038C009C01300330032009DC0A1C09DC051009CC0A0C09CC050003D003C0035002F00FF";

const CIPHERS_LIST_TXT: &str = "TLS_AES_256_GCM_SHA384:TLS_CHACHA20_POLY1305_SHA256:TLS_AES_128_GCM_SHA256:TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256:TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256:TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384:TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384:TLS_DHE_RSA_WITH_AES_128_GCM_SHA256:TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256:TLS_DHE_RSA_WITH_AES_128_CBC_SHA256:TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384:TLS_DHE_RSA_WITH_AES_256_CBC_SHA256:TLS_DHE_DSS_WITH_AES_256_GCM_SHA384:TLS_DHE_RSA_WITH_AES_256_GCM_SHA384:TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256:TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256:TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256:TLS_ECDHE_ECDSA_WITH_AES_256_CCM_8:TLS_ECDHE_ECDSA_WITH_AES_256_CCM:TLS_DHE_RSA_WITH_AES_256_CCM_8:TLS_DHE_RSA_WITH_AES_256_CCM:TLS_ECDHE_ECDSA_WITH_ARIA_256_GCM_SHA384:TLS_ECDHE_RSA_WITH_ARIA_256_GCM_SHA384:TLS_DHE_DSS_WITH_ARIA_256_GCM_SHA384:TLS_DHE_RSA_WITH_ARIA_256_GCM_SHA384:TLS_DHE_DSS_WITH_AES_128_GCM_SHA256:TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8:TLS_ECDHE_ECDSA_WITH_AES_128_CCM:TLS_DHE_RSA_WITH_AES_128_CCM_8:TLS_DHE_RSA_WITH_AES_128_CCM:TLS_ECDHE_ECDSA_WITH_ARIA_128_GCM_SHA256:TLS_ECDHE_RSA_WITH_ARIA_128_GCM_SHA256:TLS_DHE_DSS_WITH_ARIA_128_GCM_SHA256:TLS_DHE_RSA_WITH_ARIA_128_GCM_SHA256:TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384:TLS_DHE_DSS_WITH_AES_256_CBC_SHA256:TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256:TLS_DHE_DSS_WITH_AES_128_CBC_SHA256:TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA:TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA:TLS_DHE_RSA_WITH_AES_256_CBC_SHA:TLS_DHE_DSS_WITH_AES_256_CBC_SHA:TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA:TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA:TLS_DHE_RSA_WITH_AES_128_CBC_SHA:TLS_DHE_DSS_WITH_AES_128_CBC_SHA:TLS_RSA_WITH_AES_256_GCM_SHA384:TLS_RSA_WITH_AES_256_CCM_8:TLS_RSA_WITH_AES_256_CCM:TLS_RSA_WITH_ARIA_256_GCM_SHA384:TLS_RSA_WITH_AES_128_GCM_SHA256:TLS_RSA_WITH_AES_128_CCM_8:TLS_RSA_WITH_AES_128_CCM:TLS_RSA_WITH_ARIA_128_GCM_SHA256:TLS_RSA_WITH_AES_256_CBC_SHA256:TLS_RSA_WITH_AES_128_CBC_SHA256:TLS_RSA_WITH_AES_256_CBC_SHA:TLS_RSA_WITH_AES_128_CBC_SHA:TLS_EMPTY_RENEGOTIATION_INFO_SCSV";

fn tcp_info(name: &str) -> Option<Value> {
    let field = name.strip_prefix("client.socket.")?;
    match field {
        "tcp_info" => Some(Value::boolean(false)),
        _ if field.starts_with("tcpi_") => Some(Value::integer(0)),
        _ => None,
    }
}

fn quic(name: &str) -> Option<Value> {
    const FIELDS: &[&str] = &[
        "cc.cwnd",
        "cc.ssthresh",
        "num_bytes.received",
        "num_bytes.sent",
        "num_packets.ack_received",
        "num_packets.decryption_failed",
        "num_packets.late_acked",
        "num_packets.lost",
        "num_packets.received",
        "num_packets.sent",
        "rtt.latest",
        "rtt.minimum",
        "rtt.smoothed",
        "rtt.variance",
    ];
    let field = name.strip_prefix("quic.")?;
    FIELDS.contains(&field).then(|| Value::integer(0))
}

fn tls(ctx: &Context, name: &str) -> Option<Value> {
    let value = match name {
        "tls.client.cipher" => Value::string("ECDHE-RSA-AES128-GCM-SHA256"),
        "tls.client.ciphers_list" => Value::string(CIPHERS_LIST),
        "tls.client.ciphers_list_sha" => Value::string("JZtiTn8H/ntxORk+XXvU2EvNoz8="),
        "tls.client.ciphers_list_txt" => Value::string(CIPHERS_LIST_TXT),
        "tls.client.ciphers_sha" => Value::string("+7dB1w3Ov9S4Ct3HG3Qed68pSko="),
        "tls.client.handshake_sent_bytes" => Value::integer(4759),
        "tls.client.iana_chosen_cipher_id" => Value::integer(49199),
        "tls.client.ja3_md5" => Value::string("582a3b42ab84f78a5b376b1e29d6d367"),
        "tls.client.protocol" => Value::string("TLSv1.2"),
        "tls.client.servername"
        | "tls.client.tlsexts_list"
        | "tls.client.tlsexts_list_sha"
        | "tls.client.tlsexts_list_txt"
        | "tls.client.tlsexts_sha"
        | "tls.client.certificate.dn"
        | "tls.client.certificate.issuer_dn"
        | "tls.client.certificate.raw_certificate_b64"
        | "tls.client.certificate.serial_number" => Value::string(""),
        "tls.client.certificate.is_cert_bad"
        | "tls.client.certificate.is_cert_expired"
        | "tls.client.certificate.is_cert_missing"
        | "tls.client.certificate.is_cert_revoked"
        | "tls.client.certificate.is_cert_unknown"
        | "tls.client.certificate.is_unknown_ca" => Value::boolean(false),
        "tls.client.certificate.is_verified" => Value::boolean(true),
        "tls.client.certificate.not_before" => Value::time(ctx.now() - TimeDelta::days(1)),
        "tls.client.certificate.not_after" => Value::time(ctx.now() + TimeDelta::days(364)),
        "transport.type" => Value::string("tcp"),
        "transport.bw_estimate" => Value::integer(0),
        _ => return None,
    };
    Some(value)
}

impl ScopeVariables for ProtocolVariables {
    fn get(&self, ctx: &Context, name: &str) -> InterpreterResult<Option<Value>> {
        Ok(tcp_info(name).or_else(|| quic(name)).or_else(|| tls(ctx, name)))
    }
}
