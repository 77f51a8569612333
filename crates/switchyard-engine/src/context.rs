//! Execution state threaded through one run
//!
//! `ExecutionState` is owned by the run and handed to each step as `&mut`:
//! single writer, single active traversal. It keeps four regions apart:
//!
//! - `input`: the trigger payload, never modified after construction
//! - `output`: top-level node results, overwritten per visit
//! - `iterations`: loop body results keyed by node id then iteration index
//! - loop cursors: the innermost active loop's `$index`, `$item`, `$iteration`
//!
//! Templates and handlers see the merged JSON [`ExecutionState::view`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::constants::context_keys;
use crate::types::NodeId;

/// Where a node step writes its result and which edges it may follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    TopLevel,
    Group { loop_id: NodeId, iteration: usize },
}

impl Scope {
    pub fn group(loop_id: impl Into<NodeId>, iteration: usize) -> Self {
        Scope::Group {
            loop_id: loop_id.into(),
            iteration,
        }
    }

    /// Loop id used to scope edge lookups
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Scope::TopLevel => None,
            Scope::Group { loop_id, .. } => Some(loop_id),
        }
    }

    pub fn iteration(&self) -> Option<usize> {
        match self {
            Scope::TopLevel => None,
            Scope::Group { iteration, .. } => Some(*iteration),
        }
    }
}

#[derive(Debug, Clone)]
struct LoopCursor {
    loop_id: NodeId,
    index: usize,
    item: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    input: Map<String, Value>,
    output: Map<String, Value>,
    iterations: BTreeMap<NodeId, BTreeMap<usize, Value>>,
    cursors: Vec<LoopCursor>,
}

impl ExecutionState {
    /// Build the state from a trigger payload.
    ///
    /// An object payload contributes its keys; any other value is kept under
    /// `input` only.
    pub fn new(input: Value) -> Self {
        let input = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert(context_keys::INPUT.to_string(), other);
                map
            }
        };
        Self {
            input,
            ..Default::default()
        }
    }

    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Store a node result in the region selected by `scope`
    pub fn record(&mut self, node_id: &str, scope: &Scope, result: Value) {
        match scope {
            Scope::TopLevel => {
                self.output.insert(node_id.to_string(), result);
            }
            Scope::Group { iteration, .. } => {
                self.iterations
                    .entry(node_id.to_string())
                    .or_default()
                    .insert(*iteration, result);
            }
        }
    }

    /// Latest top-level result of a node
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.output.get(node_id)
    }

    /// Result of a loop body node for one iteration
    pub fn iteration_output(&self, node_id: &str, iteration: usize) -> Option<&Value> {
        self.iterations.get(node_id)?.get(&iteration)
    }

    /// Number of iterations recorded for a loop body node
    pub fn iteration_count(&self, node_id: &str) -> usize {
        self.iterations.get(node_id).map_or(0, BTreeMap::len)
    }

    /// Result of `node_id` as seen from `scope`: the same iteration slot when
    /// inside a loop body, falling back to the top-level region.
    pub fn result_in_scope(&self, node_id: &str, scope: &Scope) -> Option<&Value> {
        scope
            .iteration()
            .and_then(|i| self.iteration_output(node_id, i))
            .or_else(|| self.output(node_id))
    }

    /// Make `loop_id` the innermost active loop
    pub fn enter_loop(&mut self, loop_id: &str) {
        self.cursors.push(LoopCursor {
            loop_id: loop_id.to_string(),
            index: 0,
            item: None,
        });
    }

    /// Publish the current pass of the innermost loop
    pub fn set_cursor(&mut self, index: usize, item: Option<Value>) {
        if let Some(cursor) = self.cursors.last_mut() {
            cursor.index = index;
            cursor.item = item;
        }
    }

    pub fn leave_loop(&mut self, loop_id: &str) {
        if let Some(pos) = self.cursors.iter().rposition(|c| c.loop_id == loop_id) {
            self.cursors.truncate(pos);
        }
    }

    /// The merged context handed to templates, expressions and handlers.
    ///
    /// Input keys sit at the top level next to `input` and `output`.
    /// Iterated nodes appear under `output` as `{ "<index>": result }`.
    pub fn view(&self) -> Value {
        let mut root = self.input.clone();
        root.insert(
            context_keys::INPUT.to_string(),
            Value::Object(self.input.clone()),
        );
        root.insert(context_keys::OUTPUT.to_string(), self.output_value());

        if let Some(cursor) = self.cursors.last() {
            root.insert(context_keys::INDEX.to_string(), Value::from(cursor.index));
            root.insert(context_keys::ITERATION.to_string(), Value::from(cursor.index));
            root.insert(context_keys::LOOP.to_string(), Value::String(cursor.loop_id.clone()));
            if let Some(item) = &cursor.item {
                root.insert(context_keys::ITEM.to_string(), item.clone());
            }
        }
        Value::Object(root)
    }

    /// Persisted form: the view without loop cursors
    pub fn snapshot(&self) -> Value {
        let mut root = self.input.clone();
        root.insert(
            context_keys::INPUT.to_string(),
            Value::Object(self.input.clone()),
        );
        root.insert(context_keys::OUTPUT.to_string(), self.output_value());
        Value::Object(root)
    }

    fn output_value(&self) -> Value {
        let mut output = self.output.clone();
        for (node_id, slots) in &self.iterations {
            let indexed: Map<String, Value> = slots
                .iter()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect();
            output.insert(node_id.clone(), Value::Object(indexed));
        }
        Value::Object(output)
    }
}
