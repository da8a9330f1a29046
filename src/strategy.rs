//! Choice strategies and their elimination tokens.
//!
//! A strategy is a small capability: `make(choice)` resolves the choice and
//! returns a token, `eliminate(choice, token)` marks that resolution
//! impossible in a restored universe. Strategies and tokens are plain data
//! with no object references, so the backtracking driver can replay tokens
//! against any snapshot.

use serde::{Deserialize, Serialize};

use crate::choice;
use crate::error::{LogicError, WorldResult};
use crate::rng::RngFactory;
use crate::store::{Key, Obj, Scalar, Value};

/// A method for resolving a choice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Strategy {
    /// Pick uniformly among an enum's remaining possible values.
    EnumEven,
    /// Pick among weighted values or sub-strategies.
    Weighted(Vec<(f64, Pick)>),
    /// Connect a port to a random candidate, or commit its connections.
    /// Conservative mode commits as soon as committing is allowed.
    RandomPort { conservative: bool },
}

/// One weighted option: a plain value or a nested strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pick {
    Value(Scalar),
    Strategy(Strategy),
}

/// What a strategy chose, in replayable plain-data form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// The enum value that was selected.
    Enum(String),
    /// The port committed its current connections.
    Commit,
    /// The port connected to the peer at this path.
    Peer(String),
    /// Which weighted option ran, and the nested token if it was a strategy.
    Weighted {
        index: usize,
        inner: Option<Box<Token>>,
    },
}

fn weighted_impossible_key(index: usize) -> Key {
    Key::Tuple(vec![Key::name("_weighted_impossible"), Key::Int(index as i64)])
}

/// Resolve `choice` with this strategy, returning the elimination token.
pub fn make(strategy: &Strategy, choice: &Obj, rng: &RngFactory) -> WorldResult<Token> {
    match strategy {
        Strategy::EnumEven => {
            let path = choice.string_path();
            let impossible = choice::impossible_values(choice);
            let mut best: Option<(f64, std::sync::Arc<str>)> = None;
            for v in choice::values(choice) {
                if impossible.iter().any(|i| i.as_ref() == v.as_ref()) {
                    continue;
                }
                let key = rng.sample(&format!("{path}\0{v}\0EnumEvenDistribution"));
                let better = match &best {
                    None => true,
                    Some((k, b)) => key < *k || (key == *k && v < *b),
                };
                if better {
                    best = Some((key, v));
                }
            }
            let Some((_, picked)) = best else {
                return Err(LogicError::StrategyExhausted { path }.into());
            };
            choice::set_value(choice, Value::Str(picked.clone()))?;
            Ok(Token::Enum(picked.to_string()))
        }

        Strategy::Weighted(entries) => {
            let path = choice.string_path();
            loop {
                let mut best: Option<(f64, usize)> = None;
                for (index, (weight, _)) in entries.iter().enumerate() {
                    if choice.bool_attr(weighted_impossible_key(index), false) {
                        continue;
                    }
                    let key = rng.sample(&format!("{path}\0WeightedStrategy\0{index}")) / weight;
                    if best.is_none_or(|(k, _)| key < k) {
                        best = Some((key, index));
                    }
                }
                let Some((_, index)) = best else {
                    return Err(LogicError::StrategyExhausted { path }.into());
                };
                match &entries[index].1 {
                    Pick::Strategy(sub) => match make(sub, choice, rng) {
                        Ok(inner) => {
                            return Ok(Token::Weighted {
                                index,
                                inner: Some(Box::new(inner)),
                            });
                        }
                        Err(e) if e.is_logic() => {
                            // This branch is a dead end; disable it and redraw.
                            choice.set(weighted_impossible_key(index), true)?;
                            continue;
                        }
                        Err(e) => return Err(e),
                    },
                    Pick::Value(scalar) => {
                        choice::set_value(choice, Value::from(scalar.clone()))?;
                        return Ok(Token::Weighted { index, inner: None });
                    }
                }
            }
        }

        Strategy::RandomPort { conservative } => {
            crate::port::random_port_make(choice, *conservative, rng)
        }
    }
}

/// Apply an elimination token so the same resolution cannot recur.
pub fn eliminate(strategy: &Strategy, choice: &Obj, token: &Token) -> WorldResult<()> {
    match (strategy, token) {
        (Strategy::EnumEven, Token::Enum(v)) => choice::add_impossible_value(choice, v),
        (Strategy::Weighted(entries), Token::Weighted { index, inner }) => {
            let entry = entries
                .get(*index)
                .unwrap_or_else(|| panic!("weighted token index {index} out of range"));
            match (&entry.1, inner) {
                (Pick::Strategy(sub), Some(inner)) => eliminate(sub, choice, inner),
                _ => {
                    choice.set(weighted_impossible_key(*index), true)?;
                    choice.mark_fast_deduction()
                }
            }
        }
        (Strategy::RandomPort { .. }, Token::Commit) => {
            choice.set("commit_impossible", true)?;
            choice.mark_fast_deduction()
        }
        (Strategy::RandomPort { .. }, Token::Peer(path)) => {
            crate::port::add_impossible_connection_by_path(choice, path)
        }
        (strategy, token) => {
            panic!("elimination token {token:?} does not match strategy {strategy:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> RngFactory {
        RngFactory::from_seed(b"strategy test")
    }

    #[test]
    fn enum_even_is_deterministic() {
        let a = choice::enumeration(&["Nothing", "Wall", "Door"]).unwrap();
        let token_a = make(&Strategy::EnumEven, &a, &rng()).unwrap();
        let b = choice::enumeration(&["Nothing", "Wall", "Door"]).unwrap();
        let token_b = make(&Strategy::EnumEven, &b, &rng()).unwrap();
        assert_eq!(token_a, token_b);
        assert!(choice::known(&a));
    }

    #[test]
    fn enum_even_skips_impossible_values() {
        let c = choice::enumeration(&["Nothing", "Wall"]).unwrap();
        let first = match make(&Strategy::EnumEven, &c, &rng()).unwrap() {
            Token::Enum(v) => v,
            t => panic!("unexpected token {t:?}"),
        };
        // Re-run in a fresh universe with the first pick eliminated.
        let c2 = choice::enumeration(&["Nothing", "Wall"]).unwrap();
        choice::add_impossible_value(&c2, &first).unwrap();
        let second = match make(&Strategy::EnumEven, &c2, &rng()).unwrap() {
            Token::Enum(v) => v,
            t => panic!("unexpected token {t:?}"),
        };
        assert_ne!(first, second);
    }

    #[test]
    fn enum_even_exhaustion_is_logic() {
        let c = choice::enumeration(&["Only"]).unwrap();
        choice::add_impossible_value(&c, "Only").unwrap();
        let err = make(&Strategy::EnumEven, &c, &rng()).unwrap_err();
        assert!(err.is_logic());
    }

    #[test]
    fn weighted_picks_values_and_eliminates() {
        let strategy = Strategy::Weighted(vec![
            (3.0, Pick::Value(Scalar::Str("Wall".into()))),
            (0.5, Pick::Value(Scalar::Str("Nothing".into()))),
        ]);
        let c = choice::enumeration(&["Nothing", "Wall"]).unwrap();
        let token = make(&strategy, &c, &rng()).unwrap();
        let Token::Weighted { index, inner: None } = token.clone() else {
            panic!("unexpected token {token:?}");
        };

        // Eliminating the index forces the other entry next time.
        let c2 = choice::enumeration(&["Nothing", "Wall"]).unwrap();
        eliminate(&strategy, &c2, &token).unwrap();
        let retry = make(&strategy, &c2, &rng()).unwrap();
        let Token::Weighted { index: index2, .. } = retry else {
            panic!("unexpected token {retry:?}");
        };
        assert_ne!(index, index2);
    }

    #[test]
    fn weighted_recurses_into_sub_strategies() {
        let strategy = Strategy::Weighted(vec![(1.0, Pick::Strategy(Strategy::EnumEven))]);
        let c = choice::enumeration(&["A", "B"]).unwrap();
        let token = make(&strategy, &c, &rng()).unwrap();
        match token {
            Token::Weighted {
                index: 0,
                inner: Some(inner),
            } => assert!(matches!(*inner, Token::Enum(_))),
            t => panic!("unexpected token {t:?}"),
        }
        assert!(choice::known(&c));
    }

    #[test]
    fn weighted_falls_back_when_sub_strategy_is_exhausted() {
        let strategy = Strategy::Weighted(vec![
            (1000.0, Pick::Strategy(Strategy::EnumEven)),
            (0.001, Pick::Value(Scalar::Str("B".into()))),
        ]);
        let c = choice::enumeration(&["A", "B"]).unwrap();
        // Exhaust the enum so the heavily weighted sub-strategy dead-ends
        // and the plain-value entry is drawn instead.
        choice::add_impossible_value(&c, "A").unwrap();
        choice::add_impossible_value(&c, "B").unwrap();
        let token = make(&strategy, &c, &rng()).unwrap();
        assert!(matches!(token, Token::Weighted { index: 1, inner: None }));
        assert!(choice::known(&c));
    }
}
