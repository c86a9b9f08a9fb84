//! Handle-based API for callers on the other side of a runtime boundary.
//!
//! A [`Session`] owns every [`Model`] and every node snapshot it hands out.
//! Callers only ever hold [`ModelHandle`]s and [`NodeHandle`]s; all reads and
//! writes go through the session, which checks each handle first.

use log::debug;

use crate::{
    datatypes::{KnownType, Node},
    error::{HematiteError, Result},
    handle::{Arena, Guarded, Handle},
    model::Model,
};

pub type ModelHandle = Handle<Model>;
pub type NodeHandle = Handle<NodeSnapshot>;

/// A node copied out of a model, remembering which model it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSnapshot {
    origin: ModelHandle,
    node: Node,
}

impl NodeSnapshot {
    pub fn origin(&self) -> ModelHandle {
        self.origin
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

#[derive(Default)]
pub struct Session {
    models: Arena<Model>,
    nodes: Arena<NodeSnapshot>,
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| HematiteError::OutOfRange {
        index: value,
        len: u32::MAX as usize,
    })
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Releases every value whose guard was dropped without an explicit release
    ///
    /// Also runs at the start of each allocating call.
    pub fn reclaim_finalized(&mut self) -> usize {
        self.models.reclaim_finalized() + self.nodes.reclaim_finalized()
    }

    /// Creates a model from elasticity modulus, Poisson's ratio and shear rigidity
    #[allow(non_snake_case)]
    pub fn init(&mut self, E: f64, nu: f64, G: f64) -> ModelHandle {
        self.reclaim_finalized();
        let handle = self.models.insert(Model::new(E, nu, G));
        debug!("created model {handle:?}");
        handle
    }

    /// Takes ownership of an already built model
    pub fn adopt(&mut self, model: Model) -> ModelHandle {
        self.reclaim_finalized();
        self.models.insert(model)
    }

    pub fn release_model(&mut self, model: ModelHandle) -> Result<Model> {
        self.models.release(model)
    }

    pub fn release_node(&mut self, node: NodeHandle) -> Result<()> {
        self.nodes.release(node).map(|_| ())
    }

    pub fn guard_model(&self, model: ModelHandle) -> Guarded<Model> {
        self.models.guard(model)
    }

    pub fn guard_node(&self, node: NodeHandle) -> Guarded<NodeSnapshot> {
        self.nodes.guard(node)
    }

    pub fn live_models(&self) -> usize {
        self.models.len()
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn model(&self, model: ModelHandle) -> Result<&Model> {
        self.models.get(model)
    }

    pub fn model_mut(&mut self, model: ModelHandle) -> Result<&mut Model> {
        self.models.get_mut(model)
    }

    pub fn add_node(&mut self, model: ModelHandle) -> Result<u32> {
        to_u32(self.models.get_mut(model)?.add_node())
    }

    pub fn nodes_len(&self, model: ModelHandle) -> Result<u32> {
        to_u32(self.models.get(model)?.nodes_len())
    }

    /// Copies node `index` of `model` into a new node handle
    pub fn get_node(&mut self, model: ModelHandle, index: u32) -> Result<NodeHandle> {
        let node = self.models.get(model)?.get_node(index as usize)?;
        self.reclaim_finalized();
        Ok(self.nodes.insert(NodeSnapshot {
            origin: model,
            node,
        }))
    }

    /// Writes the snapshot behind `node` back into `model` at `index`
    ///
    /// The snapshot must have been taken from the same model.
    pub fn set_node(&mut self, model: ModelHandle, index: u32, node: NodeHandle) -> Result<()> {
        let snapshot = *self.nodes.get(node)?;
        let target = self.models.get_mut(model)?;
        if snapshot.origin != model {
            return Err(HematiteError::ForeignHandle);
        }
        target.set_node(index as usize, snapshot.node)
    }

    pub fn add_elem(&mut self, model: ModelHandle) -> Result<u32> {
        to_u32(self.models.get_mut(model)?.add_elem()?)
    }

    pub fn elements_len(&self, model: ModelHandle) -> Result<u32> {
        to_u32(self.models.get(model)?.elements_len())
    }

    pub fn get_element_indices(&self, model: ModelHandle, index: u32) -> Result<(u32, u32, u32)> {
        let [i0, i1, i2] = self.models.get(model)?.get_element_indices(index as usize)?;
        Ok((to_u32(i0)?, to_u32(i1)?, to_u32(i2)?))
    }

    pub fn set_element_indices(
        &mut self,
        model: ModelHandle,
        index: u32,
        (i0, i1, i2): (u32, u32, u32),
    ) -> Result<()> {
        self.models
            .get_mut(model)?
            .set_element_indices(index as usize, [i0 as usize, i1 as usize, i2 as usize])
    }

    pub fn step(&mut self, model: ModelHandle) -> Result<()> {
        self.models.get_mut(model)?.step()
    }

    pub fn node(&self, node: NodeHandle) -> Result<&Node> {
        Ok(&self.nodes.get(node)?.node)
    }

    pub fn node_mut(&mut self, node: NodeHandle) -> Result<&mut Node> {
        Ok(&mut self.nodes.get_mut(node)?.node)
    }

    pub fn pos_x(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.pos_x())
    }
    pub fn pos_y(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.pos_y())
    }
    pub fn set_pos_x(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_pos_x(value);
        Ok(())
    }
    pub fn set_pos_y(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_pos_y(value);
        Ok(())
    }

    pub fn disp_x(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.disp_x())
    }
    pub fn disp_y(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.disp_y())
    }
    pub fn set_disp_x(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_disp_x(value);
        Ok(())
    }
    pub fn set_disp_y(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_disp_y(value);
        Ok(())
    }

    pub fn force_x(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.force_x())
    }
    pub fn force_y(&self, node: NodeHandle) -> Result<f64> {
        Ok(self.node(node)?.force_y())
    }
    pub fn set_force_x(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_force_x(value);
        Ok(())
    }
    pub fn set_force_y(&mut self, node: NodeHandle, value: f64) -> Result<()> {
        self.node_mut(node)?.set_force_y(value);
        Ok(())
    }

    pub fn known_x(&self, node: NodeHandle) -> Result<KnownType> {
        Ok(self.node(node)?.known_x())
    }
    pub fn known_y(&self, node: NodeHandle) -> Result<KnownType> {
        Ok(self.node(node)?.known_y())
    }
    pub fn set_known_x(&mut self, node: NodeHandle, known: KnownType) -> Result<()> {
        self.node_mut(node)?.set_known_x(known);
        Ok(())
    }
    pub fn set_known_y(&mut self, node: NodeHandle, known: KnownType) -> Result<()> {
        self.node_mut(node)?.set_known_y(known);
        Ok(())
    }
}
