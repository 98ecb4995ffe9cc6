//! Director engine: builds a [`DirectorConfig`] from a declaration and picks
//! one healthy member backend per request.
//!
//! Five algorithms are supported:
//!
//! * `random`: weighted lottery over a fixed pool of [`LOTTERY_SLOTS`] slots,
//!   with quorum retries.
//! * `fallback`: first healthy backend in declaration order.
//! * `hash` and `client`: SHA-256 bucket lookup keyed by `req.hash` or the
//!   client identity.
//! * `chash`: consistent-hashing ring keyed by `req.hash` or the client
//!   identity.
//!
//! Quorum compares the integer percentage of healthy backends
//! (`healthy * 100 / total`) against the declared `.quorum`.

use crate::ast::{DirectorDeclaration, DirectorProperty, ExpressionKind, Property, Token};
use crate::context::{Context, Declarations};
use crate::error::DirectorError;
use crate::value::Backend;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Size of the `random` director's lottery pool.
pub const LOTTERY_SLOTS: usize = 1_000;

/// Upper bound for `.vnodes_per_node`.
pub const MAX_VNODES_PER_NODE: i64 = 8_388_608;

/// Default `.vnodes_per_node`.
pub const DEFAULT_VNODES_PER_NODE: i64 = 256;

/// Hash points range over `0..HASH_RANGE`.
const HASH_RANGE: u64 = 10_000;

/// Ring positions contributed by each healthy `chash` backend.
const RING_POINTS_PER_BACKEND: usize = 3;

/// Pause between `random` quorum retries.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Load-balancing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorType {
    /// Weighted random.
    Random,
    /// First healthy in order.
    Fallback,
    /// Content hash of `req.hash`.
    Hash,
    /// Hash of the client identity.
    Client,
    /// Consistent hashing.
    ConsistentHash,
}

impl DirectorType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "random" => DirectorType::Random,
            "fallback" => DirectorType::Fallback,
            "hash" => DirectorType::Hash,
            "client" => DirectorType::Client,
            "chash" => DirectorType::ConsistentHash,
            _ => return None,
        })
    }
}

impl fmt::Display for DirectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirectorType::Random => "random",
            DirectorType::Fallback => "fallback",
            DirectorType::Hash => "hash",
            DirectorType::Client => "client",
            DirectorType::ConsistentHash => "chash",
        })
    }
}

/// What a `chash` director hashes to find a ring position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKey {
    /// `req.hash`
    Object,
    /// Client identity.
    #[default]
    Client,
}

/// One member of the backend pool.
#[derive(Debug, Clone)]
pub struct DirectorBackend {
    /// Member backend.
    pub backend: Arc<Backend>,
    /// `.id` (chash).
    pub id: Option<String>,
    /// `.weight`; zero when not declared.
    pub weight: i64,
}

/// Director settings derived from a declaration.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Director name.
    pub name: String,
    /// Algorithm.
    pub director_type: DirectorType,
    /// Pool in declaration order.
    pub backends: Vec<DirectorBackend>,
    /// Minimum healthy percentage.
    pub quorum: i64,
    /// `random` attempts; zero means one per backend.
    pub retries: i64,
    /// `chash` key selector.
    pub key: HashKey,
    /// `chash` seed.
    pub seed: u32,
    /// `chash` virtual nodes per backend.
    pub vnodes_per_node: i64,
}

/// Request attributes the hashing algorithms read.
#[derive(Debug, Clone, Copy)]
pub struct SelectionKeys<'a> {
    /// `req.hash`
    pub request_hash: &'a str,
    /// `client.identity`
    pub client_identity: &'a str,
}

fn config_error(token: &Token, message: impl Into<String>) -> DirectorError {
    DirectorError::Config {
        token: token.clone(),
        message: message.into(),
    }
}

fn integer_field(property: &Property, field: &str) -> Result<i64, DirectorError> {
    match &property.value.kind {
        ExpressionKind::Integer(value) => Ok(*value),
        _ => Err(config_error(
            &property.token,
            format!("{field} value must be an integer"),
        )),
    }
}

fn parse_quorum(property: &Property) -> Result<i64, DirectorError> {
    match &property.value.kind {
        ExpressionKind::Integer(value) => Ok(*value),
        ExpressionKind::String(text) => text.trim_end_matches('%').parse().map_err(|_| {
            config_error(
                &property.token,
                format!(
                    "Invalid quorum value '{text}' found. Value must be percentage string like '50%'"
                ),
            )
        }),
        _ => Err(config_error(
            &property.token,
            "quorum value must be percentage prefixed value",
        )),
    }
}

impl DirectorConfig {
    /// Validate `declaration` and resolve its member backends.
    pub fn build(
        declaration: &DirectorDeclaration,
        declarations: &Declarations,
    ) -> Result<Self, DirectorError> {
        let director_type = DirectorType::parse(&declaration.director_type).ok_or_else(|| {
            config_error(
                &declaration.token,
                format!(
                    "Unrecognized director type '{}' provided",
                    declaration.director_type
                ),
            )
        })?;
        let mut config = DirectorConfig {
            name: declaration.name.clone(),
            director_type,
            backends: Vec::new(),
            quorum: 0,
            retries: 0,
            key: HashKey::default(),
            seed: 0,
            vnodes_per_node: DEFAULT_VNODES_PER_NODE,
        };

        for property in &declaration.properties {
            match property {
                DirectorProperty::Backend { token, fields } => {
                    let member = config.member(token, fields, declarations)?;
                    config.backends.push(member);
                }
                DirectorProperty::Field(field) => config.field(field)?,
            }
        }

        if config.backends.is_empty() {
            return Err(config_error(
                &declaration.token,
                format!(
                    "At least one backend must be specified in director '{}'",
                    config.name
                ),
            ));
        }
        Ok(config)
    }

    fn member(
        &self,
        token: &Token,
        fields: &[Property],
        declarations: &Declarations,
    ) -> Result<DirectorBackend, DirectorError> {
        let mut backend = None;
        let mut id = None;
        let mut weight = 0;
        for field in fields {
            match field.key.as_str() {
                "backend" => {
                    let ExpressionKind::Ident(name) = &field.value.kind else {
                        return Err(config_error(&field.token, "backend value must be an identifier"));
                    };
                    let found = declarations.backend(name).ok_or_else(|| {
                        config_error(&field.token, format!("backend '{name}' is not found"))
                    })?;
                    if found.as_director().is_some() {
                        return Err(config_error(
                            &field.token,
                            format!("backend '{name}' is a director and cannot be a pool member"),
                        ));
                    }
                    backend = Some(Arc::clone(found));
                }
                "id" => match &field.value.kind {
                    ExpressionKind::String(value) => id = Some(value.clone()),
                    _ => return Err(config_error(&field.token, "id value must be a string")),
                },
                "weight" => weight = integer_field(field, "weight")?,
                other => {
                    return Err(config_error(
                        &field.token,
                        format!("Unexpected director backend property '{other}' found"),
                    ));
                }
            }
        }

        let backend = backend
            .ok_or_else(|| config_error(token, ".backend property must be set"))?;
        match self.director_type {
            DirectorType::ConsistentHash => {
                if id.as_deref().is_none_or(str::is_empty) {
                    return Err(config_error(
                        token,
                        format!(".id property must be set when director type is '{}'", self.director_type),
                    ));
                }
            }
            _ => {
                if weight == 0 {
                    return Err(config_error(
                        token,
                        format!(".weight property must be set when director type is '{}'", self.director_type),
                    ));
                }
                if weight < 0 {
                    return Err(config_error(token, "weight value must be a positive integer"));
                }
            }
        }
        Ok(DirectorBackend {
            backend,
            id,
            weight,
        })
    }

    fn field(&mut self, field: &Property) -> Result<(), DirectorError> {
        let only_for = |director_type: DirectorType| {
            config_error(
                &field.token,
                format!(".{} field must be present only in {director_type} director type", field.key),
            )
        };
        match field.key.as_str() {
            "quorum" => {
                if self.director_type == DirectorType::Fallback {
                    return Err(config_error(
                        &field.token,
                        ".quorum field must not be present in fallback director type",
                    ));
                }
                self.quorum = parse_quorum(field)?;
            }
            "retries" => {
                if self.director_type != DirectorType::Random {
                    return Err(only_for(DirectorType::Random));
                }
                self.retries = integer_field(field, "retries")?;
            }
            "key" => {
                if self.director_type != DirectorType::ConsistentHash {
                    return Err(only_for(DirectorType::ConsistentHash));
                }
                self.key = match &field.value.kind {
                    ExpressionKind::Ident(key) | ExpressionKind::String(key) if key == "object" => {
                        HashKey::Object
                    }
                    ExpressionKind::Ident(key) | ExpressionKind::String(key) if key == "client" => {
                        HashKey::Client
                    }
                    _ => {
                        return Err(config_error(
                            &field.token,
                            ".key value must be either of object or client",
                        ));
                    }
                };
            }
            "seed" => {
                if self.director_type != DirectorType::ConsistentHash {
                    return Err(only_for(DirectorType::ConsistentHash));
                }
                let seed = integer_field(field, "seed")?;
                self.seed = u32::try_from(seed)
                    .map_err(|_| config_error(&field.token, ".seed value must fit in 32 bits"))?;
            }
            "vnodes_per_node" => {
                if self.director_type != DirectorType::ConsistentHash {
                    return Err(only_for(DirectorType::ConsistentHash));
                }
                let vnodes = integer_field(field, "vnodes_per_node")?;
                if vnodes > MAX_VNODES_PER_NODE {
                    return Err(config_error(
                        &field.token,
                        format!(".vnodes_per_node value is limited under {MAX_VNODES_PER_NODE}"),
                    ));
                }
                self.vnodes_per_node = vnodes;
            }
            other => {
                return Err(config_error(
                    &field.token,
                    format!("Unexpected director property '{other}' found"),
                ));
            }
        }
        Ok(())
    }

    /// Pick a healthy member for a request with the given keys.
    pub fn select(
        &self,
        keys: SelectionKeys<'_>,
        rng: &mut fastrand::Rng,
    ) -> Result<Arc<Backend>, DirectorError> {
        let selected = match self.director_type {
            DirectorType::Random => self.select_random(rng),
            DirectorType::Fallback => self.select_fallback(),
            DirectorType::Hash => self.select_bucket(keys.request_hash),
            DirectorType::Client => self.select_bucket(keys.client_identity),
            DirectorType::ConsistentHash => {
                let key = match self.key {
                    HashKey::Object => keys.request_hash,
                    HashKey::Client => keys.client_identity,
                };
                self.select_ring(key)
            }
        }?;
        debug!(director = %self.name, backend = selected.name(), "director selected backend");
        Ok(selected)
    }

    fn healthy_count(&self) -> usize {
        self.backends
            .iter()
            .filter(|member| member.backend.is_healthy())
            .count()
    }

    fn quorum_reached(&self, healthy: usize) -> bool {
        let percentage = healthy * 100 / self.backends.len().max(1);
        i64::try_from(percentage).unwrap_or(i64::MAX) >= self.quorum
    }

    fn all_failed(&self) -> DirectorError {
        DirectorError::AllBackendsFailed {
            director: self.name.clone(),
        }
    }

    fn quorum_failed(&self) -> DirectorError {
        DirectorError::QuorumWeightNotReached {
            director: self.name.clone(),
        }
    }

    /// Fill the lottery pool with member indexes, `weight` slots per healthy member.
    fn lottery(&self) -> (Vec<usize>, usize) {
        let mut pool = Vec::with_capacity(LOTTERY_SLOTS);
        let mut healthy = 0;
        let mut truncated = false;
        for (index, member) in self.backends.iter().enumerate() {
            if !member.backend.is_healthy() {
                continue;
            }
            healthy += 1;
            for _ in 0..member.weight {
                if pool.len() == LOTTERY_SLOTS {
                    truncated = true;
                    break;
                }
                pool.push(index);
            }
        }
        if truncated {
            warn!(
                director = %self.name,
                slots = LOTTERY_SLOTS,
                "summed backend weights exceed the lottery pool; later backends are truncated"
            );
        }
        (pool, healthy)
    }

    fn select_random(&self, rng: &mut fastrand::Rng) -> Result<Arc<Backend>, DirectorError> {
        let attempts = if self.retries > 0 {
            usize::try_from(self.retries).unwrap_or(usize::MAX)
        } else {
            self.backends.len()
        };
        for attempt in 0..attempts {
            let (pool, healthy) = self.lottery();
            if healthy == 0 || pool.is_empty() {
                return Err(self.all_failed());
            }
            if !self.quorum_reached(healthy) {
                warn!(director = %self.name, attempt, healthy, "quorum not reached, retrying");
                std::thread::sleep(RETRY_BACKOFF);
                continue;
            }
            let slot = pool[rng.usize(..pool.len())];
            return Ok(Arc::clone(&self.backends[slot].backend));
        }
        Err(self.quorum_failed())
    }

    fn select_fallback(&self) -> Result<Arc<Backend>, DirectorError> {
        self.backends
            .iter()
            .find(|member| member.backend.is_healthy())
            .map(|member| Arc::clone(&member.backend))
            .ok_or_else(|| self.all_failed())
    }

    /// A member wins when its name hash, reduced modulo ten times the range,
    /// lands in `[point, point + range)`. The first such member wins.
    fn select_bucket(&self, key: &str) -> Result<Arc<Backend>, DirectorError> {
        let healthy = self.healthy_count();
        if healthy == 0 {
            return Err(self.all_failed());
        }
        if !self.quorum_reached(healthy) {
            return Err(self.quorum_failed());
        }
        let point = u64_prefix(&Sha256::digest(key.as_bytes())) % HASH_RANGE;
        let bucket = point..point + HASH_RANGE;
        self.backends
            .iter()
            .filter(|member| member.backend.is_healthy())
            .find(|member| {
                let hash = u64_prefix(&Sha256::digest(member.backend.name().as_bytes()));
                bucket.contains(&(hash % (HASH_RANGE * 10)))
            })
            .map(|member| Arc::clone(&member.backend))
            .ok_or_else(|| self.all_failed())
    }

    /// Ring of positions to member indexes. A later member overwrites an
    /// earlier one on a position collision.
    fn ring(&self) -> BTreeMap<u32, usize> {
        let mut ring = BTreeMap::new();
        for (index, member) in self.backends.iter().enumerate() {
            if !member.backend.is_healthy() {
                continue;
            }
            for iteration in 0..RING_POINTS_PER_BACKEND {
                let mut hasher = Sha256::new();
                hasher.update(self.seed.to_be_bytes());
                hasher.update(member.backend.name().as_bytes());
                hasher.update(iteration.to_string().as_bytes());
                let position = u32_prefix(&hasher.finalize()) % HASH_RANGE as u32;
                ring.insert(position, index);
            }
        }
        ring
    }

    fn select_ring(&self, key: &str) -> Result<Arc<Backend>, DirectorError> {
        let healthy = self.healthy_count();
        if healthy == 0 {
            return Err(self.all_failed());
        }
        if !self.quorum_reached(healthy) {
            return Err(self.quorum_failed());
        }
        let ring = self.ring();
        let point = u32_prefix(&Sha256::digest(key.as_bytes())) % HASH_RANGE as u32;
        ring.range(point..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, index)| Arc::clone(&self.backends[*index].backend))
            .ok_or_else(|| self.all_failed())
    }
}

fn u64_prefix(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn u32_prefix(digest: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&digest[..4]);
    u32::from_be_bytes(bytes)
}

/// Build the director declared by `declaration` and select a backend for the request in `ctx`.
pub fn select_backend(
    declaration: &DirectorDeclaration,
    ctx: &mut Context,
) -> Result<Arc<Backend>, DirectorError> {
    let config = DirectorConfig::build(declaration, &ctx.declarations)?;
    let request_hash = ctx.request_hash.to_string();
    let client_identity = ctx.client_identity();
    let keys = SelectionKeys {
        request_hash: &request_hash,
        client_identity: &client_identity,
    };
    config.select(keys, &mut ctx.rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BackendDeclaration, Declaration, Expression, Program};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn origin(name: &str) -> Declaration {
        Declaration::Backend(BackendDeclaration {
            name: name.into(),
            ..Default::default()
        })
    }

    fn member(name: &str, weight: i64) -> DirectorProperty {
        DirectorProperty::Backend {
            token: Token::default(),
            fields: vec![
                Property::new("backend", Expression::ident(name)),
                Property::new("weight", Expression::integer(weight)),
            ],
        }
    }

    fn chash_member(name: &str) -> DirectorProperty {
        DirectorProperty::Backend {
            token: Token::default(),
            fields: vec![
                Property::new("backend", Expression::ident(name)),
                Property::new("id", Expression::string(name)),
            ],
        }
    }

    fn director(director_type: &str, properties: Vec<DirectorProperty>) -> DirectorDeclaration {
        DirectorDeclaration {
            token: Token::new("main.vcl", 10, 1),
            name: "pool".into(),
            director_type: director_type.into(),
            properties,
        }
    }

    fn declarations(names: &[&str]) -> Declarations {
        let program = Program::new(names.iter().map(|name| origin(name)).collect());
        Declarations::load(&program).unwrap()
    }

    fn keys<'a>(request_hash: &'a str, client_identity: &'a str) -> SelectionKeys<'a> {
        SelectionKeys {
            request_hash,
            client_identity,
        }
    }

    fn message(error: DirectorError) -> String {
        match error {
            DirectorError::Config { message, .. } => message,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn fallback_skips_unhealthy_backends() {
        let declarations = declarations(&["A", "B", "C"]);
        declarations.backend("A").unwrap().set_healthy(false);
        let config = DirectorConfig::build(
            &director("fallback", vec![member("A", 1), member("B", 1), member("C", 1)]),
            &declarations,
        )
        .unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..10 {
            let selected = config.select(keys("", "192.0.2.1"), &mut rng).unwrap();
            assert_eq!(selected.name(), "B");
        }

        for name in ["A", "B", "C"] {
            declarations.backend(name).unwrap().set_healthy(false);
        }
        assert_eq!(
            config.select(keys("", ""), &mut rng).unwrap_err(),
            DirectorError::AllBackendsFailed {
                director: "pool".into()
            }
        );
    }

    #[test]
    fn random_quorum_uses_the_healthy_percentage() {
        let declarations = declarations(&["A", "B"]);
        declarations.backend("B").unwrap().set_healthy(false);
        let mut declaration = director("random", vec![member("A", 1), member("B", 1)]);
        declaration
            .properties
            .push(DirectorProperty::Field(Property::new("quorum", Expression::string("50%"))));
        let config = DirectorConfig::build(&declaration, &declarations).unwrap();
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..20 {
            assert_eq!(config.select(keys("", ""), &mut rng).unwrap().name(), "A");
        }

        let mut strict = config.clone();
        strict.quorum = 51;
        strict.retries = 2;
        assert_eq!(
            strict.select(keys("", ""), &mut rng).unwrap_err(),
            DirectorError::QuorumWeightNotReached {
                director: "pool".into()
            }
        );
    }

    #[test]
    fn random_frequencies_follow_weights() {
        let declarations = declarations(&["A", "B"]);
        let config = DirectorConfig::build(
            &director("random", vec![member("A", 1), member("B", 3)]),
            &declarations,
        )
        .unwrap();
        let mut rng = fastrand::Rng::with_seed(11);
        let mut counts: HashMap<String, usize> = HashMap::new();
        let trials = 8_000;
        for _ in 0..trials {
            let selected = config.select(keys("", ""), &mut rng).unwrap();
            *counts.entry(selected.name().to_string()).or_default() += 1;
        }
        let share = counts["B"] as f64 / trials as f64;
        assert!((share - 0.75).abs() < 0.03, "B share was {share}");
    }

    #[test]
    fn lottery_truncates_at_the_pool_size() {
        let declarations = declarations(&["A", "B"]);
        let config = DirectorConfig::build(
            &director("random", vec![member("A", 1_000), member("B", 5)]),
            &declarations,
        )
        .unwrap();
        let (pool, healthy) = config.lottery();
        assert_eq!(pool.len(), LOTTERY_SLOTS);
        assert_eq!(healthy, 2);
        assert!(pool.iter().all(|index| *index == 0));
    }

    #[test]
    fn bucket_lookup_is_stable_for_a_key() {
        let declarations = declarations(&["A", "B", "C", "D", "E", "F", "G", "H"]);
        let members = ["A", "B", "C", "D", "E", "F", "G", "H"]
            .into_iter()
            .map(|name| member(name, 1))
            .collect();
        let config = DirectorConfig::build(&director("client", members), &declarations).unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        let first = config
            .select(keys("", "198.51.100.7"), &mut rng)
            .map(|backend| backend.name().to_string());
        let second = config
            .select(keys("", "198.51.100.7"), &mut rng)
            .map(|backend| backend.name().to_string());
        assert_eq!(first, second);
    }

    #[test]
    fn chash_quorum_fails_without_retry() {
        let declarations = declarations(&["A", "B", "C"]);
        declarations.backend("A").unwrap().set_healthy(false);
        let mut declaration = director(
            "chash",
            vec![chash_member("A"), chash_member("B"), chash_member("C")],
        );
        declaration
            .properties
            .push(DirectorProperty::Field(Property::new("quorum", Expression::string("70%"))));
        let config = DirectorConfig::build(&declaration, &declarations).unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        assert!(matches!(
            config.select(keys("", "client"), &mut rng),
            Err(DirectorError::QuorumWeightNotReached { .. })
        ));
    }

    #[test]
    fn validation_messages() {
        let declarations = declarations(&["A"]);
        let build = |declaration: DirectorDeclaration| {
            DirectorConfig::build(&declaration, &declarations).map(|_| ())
        };

        let error = build(director("round_robin", vec![member("A", 1)])).unwrap_err();
        assert_eq!(message(error), "Unrecognized director type 'round_robin' provided");

        let unweighted = DirectorProperty::Backend {
            token: Token::default(),
            fields: vec![Property::new("backend", Expression::ident("A"))],
        };
        let error = build(director("random", vec![unweighted])).unwrap_err();
        assert_eq!(
            message(error),
            ".weight property must be set when director type is 'random'"
        );

        let error = build(director("chash", vec![member("A", 1)])).unwrap_err();
        assert_eq!(
            message(error),
            ".id property must be set when director type is 'chash'"
        );

        let mut fallback = director("fallback", vec![member("A", 1)]);
        fallback
            .properties
            .push(DirectorProperty::Field(Property::new("quorum", Expression::string("10%"))));
        assert_eq!(
            message(build(fallback).unwrap_err()),
            ".quorum field must not be present in fallback director type"
        );

        let mut hash = director("hash", vec![member("A", 1)]);
        hash.properties
            .push(DirectorProperty::Field(Property::new("retries", Expression::integer(2))));
        assert_eq!(
            message(build(hash).unwrap_err()),
            ".retries field must be present only in random director type"
        );

        let mut vnodes = director("chash", vec![chash_member("A")]);
        vnodes.properties.push(DirectorProperty::Field(Property::new(
            "vnodes_per_node",
            Expression::integer(MAX_VNODES_PER_NODE + 1),
        )));
        assert_eq!(
            message(build(vnodes).unwrap_err()),
            ".vnodes_per_node value is limited under 8388608"
        );

        let missing = director("random", vec![member("Z", 1)]);
        assert_eq!(message(build(missing).unwrap_err()), "backend 'Z' is not found");

        let empty = director("random", Vec::new());
        assert_eq!(
            message(build(empty).unwrap_err()),
            "At least one backend must be specified in director 'pool'"
        );
    }

    #[test]
    fn chash_fields_are_parsed() {
        let declarations = declarations(&["A"]);
        let mut declaration = director("chash", vec![chash_member("A")]);
        declaration.properties.extend([
            DirectorProperty::Field(Property::new("key", Expression::ident("object"))),
            DirectorProperty::Field(Property::new("seed", Expression::integer(42))),
            DirectorProperty::Field(Property::new("vnodes_per_node", Expression::integer(128))),
        ]);
        let config = DirectorConfig::build(&declaration, &declarations).unwrap();
        assert_eq!(config.key, HashKey::Object);
        assert_eq!(config.seed, 42);
        assert_eq!(config.vnodes_per_node, 128);
    }

    /// Name hashes modulo 100000: 11608, 8117, 2568, 7253.
    const BUCKETED: [&str; 4] = ["origin0", "origin3", "origin25", "origin26"];

    fn selected(config: &DirectorConfig, request_hash: &str, client: &str) -> Option<String> {
        let mut rng = fastrand::Rng::with_seed(0);
        config
            .select(keys(request_hash, client), &mut rng)
            .ok()
            .map(|backend| backend.name().to_string())
    }

    #[test]
    fn hash_director_selects_known_buckets() {
        let declarations = declarations(&BUCKETED);
        let members = BUCKETED.iter().map(|name| member(name, 1)).collect();
        let config = DirectorConfig::build(&director("hash", members), &declarations).unwrap();
        // key-1 points at 9843, key-7 at 191, key-11 at 64
        assert_eq!(selected(&config, "key-1", "").as_deref(), Some("origin0"));
        assert_eq!(selected(&config, "key-7", "").as_deref(), Some("origin3"));
        assert_eq!(selected(&config, "key-11", "").as_deref(), Some("origin3"));

        declarations.backend("origin0").unwrap().set_healthy(false);
        assert_eq!(selected(&config, "key-1", ""), None);
        assert_eq!(selected(&config, "key-7", "").as_deref(), Some("origin3"));
    }

    #[test]
    fn client_director_hashes_the_identity() {
        let declarations = declarations(&BUCKETED);
        let members = BUCKETED.iter().map(|name| member(name, 1)).collect();
        let config = DirectorConfig::build(&director("client", members), &declarations).unwrap();
        // 198.51.100.7 points at 1736
        assert_eq!(selected(&config, "key-7", "198.51.100.7").as_deref(), Some("origin0"));
        declarations.backend("origin0").unwrap().set_healthy(false);
        assert_eq!(selected(&config, "key-7", "198.51.100.7").as_deref(), Some("origin3"));
    }

    #[test]
    fn bucket_misses_fail_even_with_healthy_members() {
        // every name hash here is at least 22974, beyond any reachable bucket
        let declarations = declarations(&["alpha", "bravo", "charlie"]);
        let members = ["alpha", "bravo", "charlie"]
            .into_iter()
            .map(|name| member(name, 1))
            .collect();
        let config = DirectorConfig::build(&director("hash", members), &declarations).unwrap();
        let mut rng = fastrand::Rng::with_seed(0);
        assert!(matches!(
            config.select(keys("key-1", ""), &mut rng),
            Err(DirectorError::AllBackendsFailed { .. })
        ));
    }

    #[test]
    fn chash_ring_positions_are_fixed_by_seed() {
        let (_declarations, config) = chash_config(4, 42);
        assert_eq!(selected(&config, "", "198.51.100.7").as_deref(), Some("alpha"));
        assert_eq!(selected(&config, "", "key-2").as_deref(), Some("delta"));
        assert_eq!(selected(&config, "", "key-5").as_deref(), Some("bravo"));

        let (_declarations, grown) = chash_config(5, 42);
        assert_eq!(selected(&grown, "", "198.51.100.7").as_deref(), Some("alpha"));
        assert_eq!(selected(&grown, "", "key-2").as_deref(), Some("echo"));
        assert_eq!(selected(&grown, "", "key-5").as_deref(), Some("echo"));
    }

    const NAMES: [&str; 6] = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];

    fn chash_config(count: usize, seed: u32) -> (Declarations, DirectorConfig) {
        let declarations = declarations(&NAMES);
        let members = NAMES[..count].iter().map(|name| chash_member(name)).collect();
        let mut config = DirectorConfig::build(&director("chash", members), &declarations).unwrap();
        config.seed = seed;
        (declarations, config)
    }

    proptest! {
        #[test]
        fn chash_is_deterministic(seed in any::<u32>(), key in "[a-z0-9.]{1,24}") {
            let (_declarations, config) = chash_config(4, seed);
            let mut rng = fastrand::Rng::with_seed(0);
            let first = config.select(keys("", &key), &mut rng).unwrap();
            let second = config.select(keys("", &key), &mut rng).unwrap();
            prop_assert_eq!(first.name(), second.name());
        }

        #[test]
        fn chash_growth_only_moves_keys_to_the_new_backend(
            seed in any::<u32>(),
            key in "[a-z0-9.]{1,24}",
        ) {
            let (_small_declarations, small) = chash_config(4, seed);
            let (_large_declarations, large) = chash_config(5, seed);
            let mut rng = fastrand::Rng::with_seed(0);
            let before = small.select(keys("", &key), &mut rng).unwrap();
            let after = large.select(keys("", &key), &mut rng).unwrap();
            if before.name() != after.name() {
                prop_assert_eq!(after.name(), NAMES[4]);
            }
        }

        #[test]
        fn selection_never_returns_an_unhealthy_backend(
            health in proptest::collection::vec(any::<bool>(), 6),
            kind in 0usize..5,
            key in "[a-z0-9.]{1,24}",
        ) {
            let declarations = declarations(&NAMES);
            for (name, healthy) in NAMES.iter().zip(&health) {
                declarations.backend(name).unwrap().set_healthy(*healthy);
            }
            let director_type = ["random", "fallback", "hash", "client", "chash"][kind];
            let members = NAMES
                .iter()
                .map(|name| if director_type == "chash" { chash_member(name) } else { member(name, 10) })
                .collect();
            let config = DirectorConfig::build(&director(director_type, members), &declarations).unwrap();
            let mut rng = fastrand::Rng::with_seed(5);
            match config.select(keys(&key, &key), &mut rng) {
                Ok(backend) => prop_assert!(backend.is_healthy()),
                Err(error) => prop_assert!(
                    matches!(error, DirectorError::AllBackendsFailed { .. }),
                    "unexpected {:?}", error
                ),
            }
            if health.iter().all(|healthy| !healthy) {
                prop_assert!(config.select(keys(&key, &key), &mut rng).is_err());
            }
        }
    }
}
