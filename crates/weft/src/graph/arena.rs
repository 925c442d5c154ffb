//! Flat tensor storage owned by a graph.
//!
//! Tensors are values shared between nodes; storing them in one arena and
//! handing out index handles keeps the node graph acyclic (a tensor never
//! points back at its producer).

use crate::attributes::{TensorAttr, TensorId};

#[derive(Debug, Default, Clone)]
pub(crate) struct TensorArena {
    records: Vec<TensorAttr>,
}

impl TensorArena {
    pub(crate) fn insert(&mut self, attr: TensorAttr) -> TensorId {
        let id = TensorId(self.records.len());
        self.records.push(attr);
        id
    }

    pub(crate) fn get(&self, id: TensorId) -> &TensorAttr {
        &self.records[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: TensorId) -> &mut TensorAttr {
        &mut self.records[id.0]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (TensorId, &TensorAttr)> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, attr)| (TensorId(index), attr))
    }
}
