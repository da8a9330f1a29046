//! Rich diagnostic error types for the worldloom engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`LogicError`] is special: it is the one
//! *recoverable* error class, raised only from `fast_deduce` and the strategy
//! elimination path, and the generation driver reacts to it by backtracking.
//! Everything else is a usage error and propagates to the caller unchanged.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the worldloom engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum WorldError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Logic(#[from] LogicError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vertex(#[from] VertexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Choice(#[from] ChoiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Port(#[from] PortError),
}

impl WorldError {
    /// True for the recoverable contradiction class the driver backtracks on.
    pub fn is_logic(&self) -> bool {
        matches!(self, WorldError::Logic(_))
    }
}

// ---------------------------------------------------------------------------
// Logic errors (recoverable contradictions)
// ---------------------------------------------------------------------------

/// A contradiction discovered during deduction.
///
/// May only be raised from `fast_deduce` and from the strategies' eliminate
/// path. The generation driver restores a snapshot and eliminates the choice
/// that led here; only an exhausted backtrack stack surfaces this to the caller.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LogicError {
    #[error("all potential values for {path} lead to a contradiction")]
    #[diagnostic(
        code(loom::logic::enum_exhausted),
        help(
            "Every value of this enum choice has been marked impossible. \
             The surrounding constraints cannot be satisfied with any of them."
        )
    )]
    EnumExhausted { path: String },

    #[error("{path} cannot connect to any other open port")]
    #[diagnostic(
        code(loom::logic::no_candidates),
        help(
            "The port cannot commit its current connections and no compatible \
             open port remains. A previous connection choice must be undone."
        )
    )]
    NoCandidates { path: String },

    #[error("strategy for {path} has no selectable option left")]
    #[diagnostic(
        code(loom::logic::strategy_exhausted),
        help(
            "Every option of the strategy has been eliminated. The driver \
             should backtrack past the choice that created this dead end."
        )
    )]
    StrategyExhausted { path: String },

    #[error("{path} has no strategy, and its default or assigned value led to a contradiction")]
    #[diagnostic(
        code(loom::logic::no_strategy),
        help(
            "A choice made from a plain default value cannot be re-made \
             differently. The contradiction must be resolved further up \
             the backtrack stack."
        )
    )]
    NoStrategy { path: String },

    #[error("required goals are unreachable")]
    #[diagnostic(
        code(loom::logic::goals_unreachable),
        help(
            "The conjunction of all goals configured as Required simplified \
             to false. Some choice sealed off a goal vertex."
        )
    )]
    GoalsUnreachable,
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("no such attribute: {key}")]
    #[diagnostic(
        code(loom::store::no_such_attribute),
        help(
            "The attribute is absent from the object's universe and from every \
             base universe in its history. Check the key, or use an accessor \
             with a default."
        )
    )]
    NoSuchAttribute { key: String },

    #[error("object does not exist in this universe")]
    #[diagnostic(
        code(loom::store::external_object),
        help(
            "A value referenced an object from an unrelated fork of the same \
             universe family. Two forked versions of one object cannot share \
             a universe; attach the object before forking, or fork the whole \
             family together."
        )
    )]
    ExternalObject,

    #[error("cannot write into a read-only universe snapshot")]
    #[diagnostic(
        code(loom::store::frozen_universe),
        help(
            "Snapshots produced by fork() are immutable. Mutate the live \
             successor universe instead."
        )
    )]
    FrozenUniverse,
}

// ---------------------------------------------------------------------------
// Object tree errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TreeError {
    #[error("name cannot be changed while a parent exists")]
    #[diagnostic(
        code(loom::tree::rename_while_parented),
        help("Remove the object from its parent before renaming it.")
    )]
    RenameWhileParented,

    #[error("the object does not participate in the object tree")]
    #[diagnostic(
        code(loom::tree::not_a_game_object),
        help(
            "Tree operations require game objects created through the tree \
             constructors; dictionaries and raw store objects have no parent \
             or children."
        )
    )]
    NotAGameObject,

    #[error("remove_child called on a non-child")]
    #[diagnostic(
        code(loom::tree::not_a_child),
        help("The object is not currently a child of this parent.")
    )]
    NotAChild,

    #[error("could not find root object {name:?}")]
    #[diagnostic(
        code(loom::tree::root_not_found),
        help(
            "Absolute paths start at an ancestor whose name matches the first \
             path segment. No such ancestor exists from here."
        )
    )]
    RootNotFound { name: String },

    #[error("no object at path {path:?}")]
    #[diagnostic(
        code(loom::tree::path_not_found),
        help("A path segment names a child that does not exist.")
    )]
    PathNotFound { path: String },
}

// ---------------------------------------------------------------------------
// Vertex errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum VertexError {
    #[error("condition of {path} cannot be reassigned after fast_deduce was first called")]
    #[diagnostic(
        code(loom::vertex::condition_fixed),
        help(
            "Once deduction has started, conditions may only be refined via \
             substitute(), never replaced wholesale."
        )
    )]
    ConditionFixed { path: String },
}

// ---------------------------------------------------------------------------
// Choice errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ChoiceError {
    #[error("no value has been set for {path}")]
    #[diagnostic(
        code(loom::choice::value_not_set),
        help("The choice is still unknown; its value is only readable once known.")
    )]
    ValueNotSet { path: String },

    #[error("{path} must have a value, strategy, or default before make() is called")]
    #[diagnostic(
        code(loom::choice::no_value_source),
        help(
            "Give the choice a default value, a default strategy, or an \
             explicit strategy so generation can resolve it."
        )
    )]
    NoValueSource { path: String },

    #[error("{value:?} is not a possible value for this enum")]
    #[diagnostic(
        code(loom::choice::invalid_enum_value),
        help("Only values from the enum's declared value list are accepted.")
    )]
    InvalidEnumValue { value: String },

    #[error("value {value} is outside the range {minimum:?}..={maximum:?}")]
    #[diagnostic(
        code(loom::choice::out_of_range),
        help("Numerical choices enforce their minimum/maximum bounds on set.")
    )]
    OutOfRange {
        value: i64,
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PortError {
    #[error("count cannot be fewer than 0")]
    #[diagnostic(
        code(loom::port::negative_count),
        help("Connection counts are non-negative; use disconnect to remove.")
    )]
    NegativeCount,

    #[error("this port can no longer be modified (known == true)")]
    #[diagnostic(
        code(loom::port::already_known),
        help("Committed ports are frozen. Connect before committing.")
    )]
    AlreadyKnown,

    #[error("the other port has an incompatible type")]
    #[diagnostic(
        code(loom::port::incompatible_type),
        help("The peer's type must appear in this port's compatible_types list.")
    )]
    IncompatibleType,

    #[error("this port cannot connect to itself")]
    #[diagnostic(
        code(loom::port::self_connection),
        help("Set can_self_connect on the port if a self loop is intended.")
    )]
    SelfConnection,

    #[error("this would put the number of unique connections above maximum_unique_connections")]
    #[diagnostic(code(loom::port::too_many_unique), help("Disconnect another peer first."))]
    TooManyUniqueConnections,

    #[error("this would put the number of connections above maximum_connections")]
    #[diagnostic(code(loom::port::too_many_connections), help("Disconnect another peer first."))]
    TooManyConnections,

    #[error("connecting these ports is known to cause a contradiction")]
    #[diagnostic(
        code(loom::port::impossible_peer),
        help("The peer was eliminated during generation and cannot be retried.")
    )]
    ImpossiblePeer,

    #[error("the ports are not connected")]
    #[diagnostic(
        code(loom::port::not_connected),
        help("disconnect() requires an existing connection to the peer.")
    )]
    NotConnected,

    #[error("a count was specified that is greater than the number of existing connections")]
    #[diagnostic(
        code(loom::port::disconnect_underflow),
        help("Disconnect at most as many connections as currently exist.")
    )]
    DisconnectUnderflow,

    #[error("cannot start at the other port")]
    #[diagnostic(
        code(loom::port::cannot_start),
        help("The start port only connects to movement ports with can_start set.")
    )]
    CannotStart,
}

/// Convenience alias for functions returning worldloom results.
pub type WorldResult<T> = std::result::Result<T, WorldError>;
