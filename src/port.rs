//! Ports: linkable connection endpoints with cardinality and type limits.
//!
//! A port is a specialized choice whose unknown value is a multiset of peer
//! ports. Connections are kept symmetric on both halves; `commit` freezes
//! the current multiset as the choice's value. A per-world open-port cache
//! indexes open ports by concrete type and by compatible type so candidate
//! search stays cheap, and re-queues dependents when a class empties.

use crate::choice;
use crate::error::{LogicError, PortError, WorldResult};
use crate::rng::RngFactory;
use crate::store::{Key, Obj, OrdDict, Value};
use crate::strategy::Token;
use crate::typedef::{TypeDef, TypeHooks, TypeRef};

pub struct PortHooks;

impl TypeHooks for PortHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        fast_deduce(obj)
    }

    fn on_set(&self, port: &Obj, _value: &Value) -> WorldResult<()> {
        remove_from_open_cache(port)
    }
}

/// A linkable connection endpoint.
pub static PORT: TypeDef = TypeDef {
    name: "Port",
    base: Some(&choice::CHOICE),
    hooks: &PortHooks,
};

/// A port a player can travel through, with `can_enter`/`can_exit` gates.
pub static MOVEMENT_PORT: TypeDef = TypeDef {
    name: "MovementPort",
    base: Some(&PORT),
    hooks: &PortHooks,
};

/// The world's starting-position port; only accepts `can_start` peers.
pub static START_PORT: TypeDef = TypeDef {
    name: "StartPort",
    base: Some(&MOVEMENT_PORT),
    hooks: &PortHooks,
};

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn new() -> WorldResult<Obj> {
    let p = crate::tree::new_object(&PORT)?;
    init(&p)?;
    Ok(p)
}

/// A movement port with always-true enter/exit gate vertices.
pub fn movement() -> WorldResult<Obj> {
    movement_of(&MOVEMENT_PORT)
}

pub(crate) fn movement_of(kind: &'static TypeDef) -> WorldResult<Obj> {
    let p = crate::tree::new_object(kind)?;
    init(&p)?;
    let enter = crate::vertex::new()?;
    crate::vertex::set_condition(&enter, crate::cond::Cond::True)?;
    p.set("can_enter", Value::Object(enter))?;
    let exit = crate::vertex::new()?;
    crate::vertex::set_condition(&exit, crate::cond::Cond::True)?;
    p.set("can_exit", Value::Object(exit))?;
    Ok(p)
}

/// The unlimited, conservative port hanging off the starting position.
pub fn start_port() -> WorldResult<Obj> {
    let p = movement_of(&START_PORT)?;
    p.set("maximum_connections", Value::None)?;
    p.set("maximum_unique_connections", Value::None)?;
    p.set("minimum_connections", 0)?;
    p.set("minimum_unique_connections", 0)?;
    p.set(
        "default",
        Value::from(crate::strategy::Strategy::RandomPort { conservative: true }),
    )?;
    Ok(p)
}

pub(crate) fn init(p: &Obj) -> WorldResult<()> {
    p.set("chosen_connections", OrdDict::new_in(p).value())
}

// ---------------------------------------------------------------------------
// Configuration accessors
// ---------------------------------------------------------------------------

fn chosen(port: &Obj) -> OrdDict {
    OrdDict::from_obj(
        port.obj_attr("chosen_connections")
            .expect("ports carry a chosen_connections dictionary"),
    )
}

fn limit_attr(port: &Obj, name: &str, default: Option<i64>) -> Option<i64> {
    match port.get(name) {
        Some(Value::Int(n)) => Some(n),
        Some(Value::None) => None,
        _ => default,
    }
}

/// Maximum total connections; `None` is unlimited.
pub fn max_connections(port: &Obj) -> Option<i64> {
    limit_attr(port, "maximum_connections", Some(1))
}

/// Maximum distinct peers; `None` is unlimited.
pub fn max_unique_connections(port: &Obj) -> Option<i64> {
    limit_attr(port, "maximum_unique_connections", Some(1))
}

pub fn min_connections(port: &Obj) -> i64 {
    limit_attr(port, "minimum_connections", Some(1)).unwrap_or(0)
}

pub fn min_unique_connections(port: &Obj) -> i64 {
    limit_attr(port, "minimum_unique_connections", Some(1)).unwrap_or(0)
}

pub fn can_self_connect(port: &Obj) -> bool {
    port.bool_attr("can_self_connect", false)
}

pub fn can_start(port: &Obj) -> bool {
    port.bool_attr("can_start", true)
}

pub fn commit_impossible(port: &Obj) -> bool {
    port.bool_attr("commit_impossible", false)
}

/// Port types this port may link to.
pub fn compatible_types(port: &Obj) -> Vec<&'static TypeDef> {
    if let Some(Value::Tuple(items)) = port.get("compatible_types") {
        return items
            .into_iter()
            .filter_map(|v| match v {
                Value::Type(t) => Some(t.0),
                _ => None,
            })
            .collect();
    }
    if port.kind().is_a(&MOVEMENT_PORT) {
        vec![&MOVEMENT_PORT]
    } else {
        vec![&PORT]
    }
}

pub fn impossible_connections(port: &Obj) -> Vec<Obj> {
    match port.get("impossible_connections") {
        Some(Value::Tuple(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(o) => Some(o),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn sum_connections(port: &Obj) -> i64 {
    chosen(port)
        .values()
        .into_iter()
        .filter_map(|v| v.as_int())
        .sum()
}

fn unique_connections(port: &Obj) -> i64 {
    chosen(port).len()
}

/// The connected peers and their counts. Valid before and after commit.
pub fn connections(port: &Obj) -> Vec<(Obj, i64)> {
    chosen(port)
        .iter()
        .filter_map(|(k, v)| match (k, v.as_int()) {
            (Key::Object(peer), Some(n)) => Some((peer, n)),
            _ => None,
        })
        .collect()
}

/// The frozen connection multiset of a committed port.
pub(crate) fn committed_connections(port: &Obj) -> WorldResult<OrdDict> {
    let value = choice::value(port)?;
    match value {
        Value::Object(o) => Ok(OrdDict::from_obj(o)),
        _ => Err(PortError::NotConnected.into()),
    }
}

// ---------------------------------------------------------------------------
// Connection operations
// ---------------------------------------------------------------------------

/// Validate that `connect(port, other, count)` would succeed.
pub fn test_connect(port: &Obj, other: &Obj, count: i64, test_other: bool) -> WorldResult<()> {
    if count < 0 {
        return Err(PortError::NegativeCount.into());
    }
    if choice::known(port) {
        return Err(PortError::AlreadyKnown.into());
    }
    if !compatible_types(port).iter().any(|t| other.kind().is_a(t)) {
        return Err(PortError::IncompatibleType.into());
    }
    if port == other && !can_self_connect(port) {
        return Err(PortError::SelfConnection.into());
    }
    if port.kind().is_a(&START_PORT) && !can_start(other) {
        return Err(PortError::CannotStart.into());
    }
    let existing = chosen(port).contains(&Key::Object(other.clone()));
    if let Some(max_unique) = max_unique_connections(port) {
        let new_unique = unique_connections(port) - i64::from(existing)
            + i64::from(count != 0);
        if new_unique > max_unique {
            return Err(PortError::TooManyUniqueConnections.into());
        }
    }
    if let Some(max) = max_connections(port) {
        let current = chosen(port)
            .get(&Key::Object(other.clone()))
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        if sum_connections(port) - current + count > max {
            return Err(PortError::TooManyConnections.into());
        }
    }
    if impossible_connections(port).contains(other) {
        return Err(PortError::ImpossiblePeer.into());
    }
    if test_other {
        test_connect(other, port, count, false)?;
    }
    Ok(())
}

/// Set the connection count between two ports, symmetrically.
/// A count of zero removes the pair.
pub fn connect(port: &Obj, other: &Obj, count: i64) -> WorldResult<()> {
    test_connect(port, other, count, true)?;
    let key_other = Key::Object(other.clone());
    let key_self = Key::Object(port.clone());
    if count == 0 {
        if !chosen(port).contains(&key_other) {
            return Err(PortError::NotConnected.into());
        }
        chosen(port).remove(&key_other)?;
        if port != other {
            chosen(other).remove(&key_self)?;
        }
    } else {
        chosen(port).insert(key_other, Value::Int(count))?;
        if port != other {
            chosen(other).insert(key_self, Value::Int(count))?;
        }
    }
    port.mark_fast_deduction()?;
    other.mark_fast_deduction()
}

/// Add `count` connections on top of any existing ones.
pub fn multi_connect(port: &Obj, other: &Obj, count: i64) -> WorldResult<()> {
    let current = chosen(port)
        .get(&Key::Object(other.clone()))
        .and_then(|v| v.as_int())
        .unwrap_or(0);
    connect(port, other, current + count)
}

pub fn test_multi_connect(port: &Obj, other: &Obj, count: i64, test_other: bool) -> WorldResult<()> {
    let current = chosen(port)
        .get(&Key::Object(other.clone()))
        .and_then(|v| v.as_int())
        .unwrap_or(0);
    test_connect(port, other, current + count, test_other)
}

/// Remove `count` connections to a peer, or all of them.
pub fn disconnect(port: &Obj, other: &Obj, count: Option<i64>) -> WorldResult<()> {
    match count {
        None => connect(port, other, 0),
        Some(count) => {
            let current = chosen(port)
                .get(&Key::Object(other.clone()))
                .and_then(|v| v.as_int())
                .unwrap_or(0);
            let remaining = current - count;
            if remaining < 0 {
                return Err(PortError::DisconnectUnderflow.into());
            }
            connect(port, other, remaining)
        }
    }
}

pub fn disconnect_all(port: &Obj) -> WorldResult<()> {
    while let Some(Key::Object(other)) = chosen(port).first_key() {
        connect(port, &other, 0)?;
    }
    Ok(())
}

/// Whether the current connections satisfy the minimums.
pub fn can_commit(port: &Obj) -> bool {
    !commit_impossible(port)
        && unique_connections(port) >= min_unique_connections(port)
        && sum_connections(port) >= min_connections(port)
}

/// Freeze the current connections as this port's value.
pub fn commit(port: &Obj) -> WorldResult<()> {
    let value = chosen(port).value();
    choice::set_value(port, value)
}

// ---------------------------------------------------------------------------
// Open-port cache
// ---------------------------------------------------------------------------

fn open_cache(world: &Obj) -> Option<(OrdDict, OrdDict)> {
    let by_type = world.obj_attr("_open_by_type")?;
    let by_compat = world.obj_attr("_open_by_compatible")?;
    Some((OrdDict::from_obj(by_type), OrdDict::from_obj(by_compat)))
}

fn cache_class(index: &OrdDict, t: &'static TypeDef) -> WorldResult<OrdDict> {
    let key = Key::Type(TypeRef(t));
    if let Some(Value::Object(o)) = index.get(&key) {
        return Ok(OrdDict::from_obj(o));
    }
    let class = OrdDict::new_in(index.obj());
    index.insert(key, class.value())?;
    Ok(class)
}

fn add_to_open_cache(port: &Obj, by_type: &OrdDict, by_compat: &OrdDict) -> WorldResult<()> {
    let mut t = port.kind();
    while !t.is(&choice::CHOICE) {
        cache_class(by_type, t)?.insert(Key::Object(port.clone()), Value::None)?;
        t = t.base.expect("port types descend from Choice");
    }
    for ct in compatible_types(port) {
        cache_class(by_compat, ct)?.insert(Key::Object(port.clone()), Value::None)?;
    }
    Ok(())
}

/// Build the world's open-port cache on first use.
fn build_open_cache(port: &Obj) -> WorldResult<()> {
    let Some(world) = port.get_world() else {
        return Ok(());
    };
    if world.has("_open_by_type") {
        return Ok(());
    }
    let by_type = OrdDict::new_in(&world);
    let by_compat = OrdDict::new_in(&world);
    let mut queue = vec![world.clone()];
    while let Some(obj) = queue.pop() {
        if obj.kind().is_a(&PORT) && !choice::known(&obj) {
            add_to_open_cache(&obj, &by_type, &by_compat)?;
        }
        if let Some(children) = obj.children() {
            for (_, value) in children.iter() {
                if let Value::Object(child) = value {
                    queue.push(child);
                }
            }
        }
    }
    world.set("_open_by_type", by_type.value())?;
    world.set("_open_by_compatible", by_compat.value())
}

/// Drop a newly known port from the cache; when a class empties, re-queue
/// every port that was counting on it.
fn remove_from_open_cache(port: &Obj) -> WorldResult<()> {
    let Some(world) = port.get_world() else {
        return Ok(());
    };
    let Some((by_type, by_compat)) = open_cache(&world) else {
        return Ok(());
    };
    let port_key = Key::Object(port.clone());
    let mut t = port.kind();
    while !t.is(&choice::CHOICE) {
        if let Some(Value::Object(o)) = by_type.get(&Key::Type(TypeRef(t))) {
            let class = OrdDict::from_obj(o);
            if class.contains(&port_key) {
                class.remove(&port_key)?;
            }
            if class.is_empty() {
                if let Some(Value::Object(o)) = by_compat.get(&Key::Type(TypeRef(t))) {
                    for key in OrdDict::from_obj(o).keys() {
                        if let Key::Object(other) = key {
                            other.mark_fast_deduction()?;
                        }
                    }
                }
            }
        }
        t = t.base.expect("port types descend from Choice");
    }
    for ct in compatible_types(port) {
        if let Some(Value::Object(o)) = by_compat.get(&Key::Type(TypeRef(ct))) {
            let class = OrdDict::from_obj(o);
            if class.contains(&port_key) {
                class.remove(&port_key)?;
            }
            if class.is_empty() {
                if let Some(Value::Object(o)) = by_type.get(&Key::Type(TypeRef(ct))) {
                    for key in OrdDict::from_obj(o).keys() {
                        if let Key::Object(other) = key {
                            other.mark_fast_deduction()?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Open ports this one might connect to.
///
/// Intersects the type and compatible-type indexes, drops eliminated peers,
/// and dry-runs `test_multi_connect` on each survivor.
pub fn get_candidates(port: &Obj) -> WorldResult<Vec<Obj>> {
    build_open_cache(port)?;
    let Some(world) = port.get_world() else {
        return Ok(Vec::new());
    };
    let Some((by_type, by_compat)) = open_cache(&world) else {
        return Ok(Vec::new());
    };

    let mut type_candidates: Vec<Obj> = Vec::new();
    for ct in compatible_types(port) {
        if let Some(Value::Object(o)) = by_type.get(&Key::Type(TypeRef(ct))) {
            for key in OrdDict::from_obj(o).keys() {
                if let Key::Object(candidate) = key {
                    if !type_candidates.contains(&candidate) {
                        type_candidates.push(candidate);
                    }
                }
            }
        }
    }

    let mut compat_members: Vec<Obj> = Vec::new();
    let mut t = port.kind();
    while !t.is(&choice::CHOICE) {
        if let Some(Value::Object(o)) = by_compat.get(&Key::Type(TypeRef(t))) {
            for key in OrdDict::from_obj(o).keys() {
                if let Key::Object(candidate) = key {
                    if !compat_members.contains(&candidate) {
                        compat_members.push(candidate);
                    }
                }
            }
        }
        t = t.base.expect("port types descend from Choice");
    }

    let impossible = impossible_connections(port);
    let candidates = type_candidates
        .into_iter()
        .filter(|c| compat_members.contains(c))
        .filter(|c| !impossible.contains(c))
        .filter(|c| test_multi_connect(port, c, 1, true).is_ok())
        .collect();
    Ok(candidates)
}

/// Port deduction: commit when the maximum is reached, or fail when the
/// port can neither commit nor connect anywhere.
pub fn fast_deduce(port: &Obj) -> WorldResult<()> {
    build_open_cache(port)?;
    if choice::known(port) {
        return Ok(());
    }
    if let Some(max) = max_connections(port) {
        if sum_connections(port) == max {
            return commit(port);
        }
    }
    if !can_commit(port) && get_candidates(port)?.is_empty() {
        return Err(LogicError::NoCandidates {
            path: port.string_path(),
        }
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Random port strategy
// ---------------------------------------------------------------------------

/// `RandomPortStrategy`: commit or connect to the RNG-minimal candidate.
pub(crate) fn random_port_make(
    port: &Obj,
    conservative: bool,
    rng: &RngFactory,
) -> WorldResult<Token> {
    let committable = can_commit(port);
    if committable && conservative {
        commit(port)?;
        return Ok(Token::Commit);
    }
    let path = port.string_path();
    let mut candidates = get_candidates(port)?;
    loop {
        let mut best: Option<(f64, String, Option<Obj>)> = None;
        if committable {
            let key = rng.sample(&format!("{path}\0COMMIT\0RandomPortStrategy"));
            best = Some((key, "COMMIT".to_string(), None));
        }
        for candidate in &candidates {
            let peer_path = candidate.string_path();
            let key = rng.sample(&format!("{path}\0{peer_path}\0RandomPortStrategy"));
            let better = match &best {
                None => true,
                Some((k, p, _)) => key < *k || (key == *k && peer_path < *p),
            };
            if better {
                best = Some((key, peer_path, Some(candidate.clone())));
            }
        }
        let Some((_, _, picked)) = best else {
            return Err(LogicError::NoCandidates { path }.into());
        };
        match picked {
            None => {
                commit(port)?;
                return Ok(Token::Commit);
            }
            Some(peer) => {
                if test_multi_connect(port, &peer, 1, true).is_err() {
                    candidates.retain(|c| *c != peer);
                    continue;
                }
                multi_connect(port, &peer, 1)?;
                return Ok(Token::Peer(peer.string_path()));
            }
        }
    }
}

/// Record an eliminated peer, addressed by path so tokens stay plain data.
pub(crate) fn add_impossible_connection_by_path(port: &Obj, peer_path: &str) -> WorldResult<()> {
    let segments: Vec<&str> = peer_path.split('.').collect();
    let peer = port.object_from_path(&segments, false)?;
    let mut impossible: Vec<Value> = match port.get("impossible_connections") {
        Some(Value::Tuple(items)) => items,
        _ => Vec::new(),
    };
    impossible.push(Value::Object(peer));
    port.set("impossible_connections", Value::Tuple(impossible))?;
    port.mark_fast_deduction()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_ports() -> (Obj, Obj) {
        let a = new().unwrap();
        let b = new().unwrap();
        // Pull both into one family the way sibling ports share a world.
        a.set("peer_hint", Value::Object(b.clone())).unwrap();
        (a, b)
    }

    #[test]
    fn connect_is_symmetric() {
        let (a, b) = two_ports();
        connect(&a, &b, 1).unwrap();
        assert_eq!(connections(&a), vec![(b.clone(), 1)]);
        assert_eq!(connections(&b), vec![(a.clone(), 1)]);
        disconnect(&a, &b, None).unwrap();
        assert!(connections(&a).is_empty());
        assert!(connections(&b).is_empty());
    }

    #[test]
    fn maximums_are_enforced() {
        let (a, b) = two_ports();
        let c = new().unwrap();
        a.set("other_hint", Value::Object(c.clone())).unwrap();
        connect(&a, &b, 1).unwrap();
        // Unique and total maxes both default to one.
        let err = test_connect(&a, &c, 1, true).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::TooManyUniqueConnections)
        ));
        let err = test_multi_connect(&a, &b, 1, true).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::TooManyConnections)
        ));
    }

    #[test]
    fn self_connection_requires_opt_in() {
        let (a, _) = two_ports();
        a.set("maximum_connections", 2).unwrap();
        a.set("maximum_unique_connections", 2).unwrap();
        let err = test_connect(&a, &a, 1, true).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::SelfConnection)
        ));
        a.set("can_self_connect", true).unwrap();
        connect(&a, &a, 1).unwrap();
        assert_eq!(connections(&a), vec![(a.clone(), 1)]);
    }

    #[test]
    fn commit_freezes_the_port() {
        let (a, b) = two_ports();
        connect(&a, &b, 1).unwrap();
        assert!(can_commit(&a));
        commit(&a).unwrap();
        assert!(choice::known(&a));
        let err = test_connect(&a, &b, 1, true).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::AlreadyKnown)
        ));
        let frozen = committed_connections(&a).unwrap();
        assert_eq!(frozen.len(), 1);
    }

    #[test]
    fn unsatisfied_minimum_blocks_commit() {
        let (a, _) = two_ports();
        assert!(!can_commit(&a));
        a.set("minimum_connections", 0).unwrap();
        a.set("minimum_unique_connections", 0).unwrap();
        assert!(can_commit(&a));
        a.set("commit_impossible", true).unwrap();
        assert!(!can_commit(&a));
    }

    #[test]
    fn disconnect_underflow_is_rejected() {
        let (a, b) = two_ports();
        connect(&a, &b, 1).unwrap();
        let err = disconnect(&a, &b, Some(2)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::DisconnectUnderflow)
        ));
    }

    #[test]
    fn movement_ports_carry_gate_vertices() {
        let p = movement().unwrap();
        let enter = p.obj_attr("can_enter").unwrap();
        assert!(enter.kind().is_a(&crate::vertex::VERTEX));
        assert_eq!(enter.parent(), Some(p.clone()));
        assert_eq!(crate::vertex::condition(&enter), crate::cond::Cond::True);
    }

    #[test]
    fn incompatible_types_are_rejected() {
        let movement = movement().unwrap();
        let plain = new().unwrap();
        movement
            .set("peer_hint", Value::Object(plain.clone()))
            .unwrap();
        let err = test_connect(&movement, &plain, 1, true).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Port(PortError::IncompatibleType)
        ));
    }
}
