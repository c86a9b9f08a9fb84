use log::{info, warn};

use crate::{
    datatypes::{Element, KnownType, Material, Node, Stress},
    error::{HematiteError, Result, SingularCause},
    solver::{self, SolverConfig, DOF},
};

/// Linear static plane stress model built from T3 elements
///
/// Nodes and elements are only reachable as copies; edits take effect through
/// [`Model::set_node`] and [`Model::set_element_indices`].
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    material: Material,
    nodes: Vec<Node>,
    elements: Vec<Element>,
    solver_config: SolverConfig,
}

impl Model {
    /// Creates an empty model from elasticity modulus, Poisson's ratio and
    /// shear rigidity
    #[allow(non_snake_case)]
    pub fn new(E: f64, nu: f64, G: f64) -> Model {
        Model::with_material(Material::new(E, nu, G))
    }

    pub fn with_material(material: Material) -> Model {
        Model {
            material,
            nodes: Vec::new(),
            elements: Vec::new(),
            solver_config: SolverConfig::default(),
        }
    }

    pub fn with_solver_config(mut self, solver_config: SolverConfig) -> Model {
        self.solver_config = solver_config;
        self
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn solver_config(&self) -> &SolverConfig {
        &self.solver_config
    }

    pub fn set_solver_config(&mut self, solver_config: SolverConfig) {
        self.solver_config = solver_config;
    }

    /// Appends a clamped node at the origin
    ///
    /// # Returns
    /// The index of the new node
    pub fn add_node(&mut self) -> usize {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }

    /// Appends copies of `nodes`
    ///
    /// # Returns
    /// The index of the first appended node
    pub fn add_nodes(&mut self, nodes: &[Node]) -> usize {
        let first = self.nodes.len();
        self.nodes.extend_from_slice(nodes);
        first
    }

    pub fn nodes_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get_node(&self, index: usize) -> Result<Node> {
        self.nodes
            .get(index)
            .copied()
            .ok_or(HematiteError::OutOfRange {
                index,
                len: self.nodes.len(),
            })
    }

    /// Overwrites the node at `index` with `node`
    pub fn set_node(&mut self, index: usize, node: Node) -> Result<()> {
        let len = self.nodes.len();
        let slot = self
            .nodes
            .get_mut(index)
            .ok_or(HematiteError::OutOfRange { index, len })?;
        *slot = node;
        Ok(())
    }

    /// Appends an element with node indices `(0, 0, 0)`
    ///
    /// The element is degenerate until [`Model::set_element_indices`] is called.
    pub fn add_elem(&mut self) -> Result<usize> {
        if self.nodes.len() < 3 {
            return Err(HematiteError::InsufficientNodes {
                nodes: self.nodes.len(),
            });
        }
        self.elements.push(Element::default());
        Ok(self.elements.len() - 1)
    }

    /// Appends one element per index triple, all or nothing
    ///
    /// # Returns
    /// The index of the first appended element
    pub fn add_elements(&mut self, elements: &[[usize; 3]]) -> Result<usize> {
        if self.nodes.len() < 3 {
            return Err(HematiteError::InsufficientNodes {
                nodes: self.nodes.len(),
            });
        }
        for indices in elements {
            self.check_indices(indices)?;
        }
        let first = self.elements.len();
        self.elements
            .extend(elements.iter().map(|&indices| Element::new(indices)));
        Ok(first)
    }

    pub fn elements_len(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    fn element(&self, index: usize) -> Result<&Element> {
        self.elements.get(index).ok_or(HematiteError::OutOfRange {
            index,
            len: self.elements.len(),
        })
    }

    pub fn get_element_indices(&self, index: usize) -> Result<[usize; 3]> {
        Ok(self.element(index)?.node_indices())
    }

    /// Replaces all three node indices of an element
    ///
    /// Duplicate indices are accepted here and rejected by [`Model::step`].
    pub fn set_element_indices(&mut self, index: usize, indices: [usize; 3]) -> Result<()> {
        self.element(index)?;
        self.check_indices(&indices)?;
        self.elements[index] = Element::new(indices);
        Ok(())
    }

    /// Stress from the last successful solve, `None` if the element changed since
    pub fn element_stress(&self, index: usize) -> Result<Option<Stress>> {
        Ok(self.element(index)?.stress())
    }

    fn check_indices(&self, indices: &[usize; 3]) -> Result<()> {
        match indices.iter().find(|&&i| i >= self.nodes.len()) {
            Some(&node) => Err(HematiteError::InvalidReference {
                node,
                nodes: self.nodes.len(),
            }),
            None => Ok(()),
        }
    }

    /// Verifies that the mesh can be solved
    ///
    /// Element indices are valid by construction, so this reports the first
    /// element without area, or the first force-known node outside every element.
    pub fn check(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(SingularCause::NoElements.into());
        }

        let mut node_in_element = vec![false; self.nodes.len()];
        for (element_index, element) in self.elements.iter().enumerate() {
            if solver::is_degenerate(element, &self.nodes) {
                return Err(SingularCause::DegenerateElement {
                    element: element_index,
                }
                .into());
            }
            for &node_index in &element.nodes {
                node_in_element[node_index] = true;
            }
        }

        for (node_index, &in_element) in node_in_element.iter().enumerate() {
            if in_element {
                continue;
            }
            let node = &self.nodes[node_index];
            if (0..DOF).any(|axis| node.known(axis) == KnownType::Force) {
                return Err(SingularCause::UnconnectedNode { node: node_index }.into());
            }
            warn!("node {node_index} is not part of an element and only carries its prescribed displacement");
        }

        Ok(())
    }

    /// Solves for every unknown displacement and force
    ///
    /// Results are written back into each node's non-authoritative slots and
    /// each element's stress. Nothing is written when the solve fails.
    pub fn step(&mut self) -> Result<()> {
        self.check()?;

        let solution = solver::run(
            &self.nodes,
            &self.elements,
            &self.material,
            &self.solver_config,
        )?;

        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.load_result(
                [solution.displacements[DOF * i], solution.displacements[DOF * i + 1]],
                [solution.forces[DOF * i], solution.forces[DOF * i + 1]],
            );
        }
        for (element, stress) in self.elements.iter_mut().zip(solution.stresses) {
            element.stress = Some(stress);
        }
        info!(
            "solve complete for {} nodes and {} elements",
            self.nodes.len(),
            self.elements.len()
        );

        Ok(())
    }
}
