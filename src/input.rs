use json::JsonValue;
use log::info;

use crate::{
    datatypes::{KnownType, Material, Node, Vertex},
    error::{HematiteError, Result},
    model::Model,
    solver::{SolverConfig, SolverMethod},
};

#[derive(Debug)]
struct BoundaryRegion {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl BoundaryRegion {
    fn contains(&self, vertex: &Vertex) -> bool {
        vertex.x > self.x_min
            && vertex.x < self.x_max
            && vertex.y > self.y_min
            && vertex.y < self.y_max
    }
}

#[derive(Debug)]
struct BoundaryTarget {
    ux: Option<f64>,
    uy: Option<f64>,
    fx: Option<f64>,
    fy: Option<f64>,
}

#[derive(Debug)]
struct BoundaryRule {
    name: String,
    region: BoundaryRegion,
    target: BoundaryTarget,
}

impl BoundaryRule {
    fn apply(&self, node: &mut Node) {
        match (self.target.ux, self.target.fx) {
            (Some(ux), _) => {
                node.set_known_x(KnownType::Displacement);
                node.set_disp_x(ux);
            }
            (None, Some(fx)) => {
                node.set_known_x(KnownType::Force);
                node.set_force_x(fx);
            }
            (None, None) => {}
        }
        match (self.target.uy, self.target.fy) {
            (Some(uy), _) => {
                node.set_known_y(KnownType::Displacement);
                node.set_disp_y(uy);
            }
            (None, Some(fy)) => {
                node.set_known_y(KnownType::Force);
                node.set_force_y(fy);
            }
            (None, None) => {}
        }
    }
}

/// Reads and parses an input file
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = std::fs::read_to_string(input_file).map_err(|err| {
        HematiteError::Input(format!("Unable to open input file {input_file}: {err}"))
    })?;

    parse_input(&file_string)
}

/// Parses an input document and checks its required sections
pub fn parse_input(contents: &str) -> Result<JsonValue> {
    let input_json = json::parse(contents)
        .map_err(|err| HematiteError::Input(format!("Error in input file json: {err}")))?;

    for key in ["metadata", "nodes", "elements"] {
        if !input_json.has_key(key) {
            return Err(HematiteError::Input(format!(
                "Input json missing {key} field"
            )));
        }
    }
    for key in ["material_elasticity", "poisson_ratio"] {
        if !input_json["metadata"].has_key(key) {
            return Err(HematiteError::Input(format!(
                "Input json missing {key} field in metadata section"
            )));
        }
    }

    Ok(input_json)
}

fn required_f64(value: &JsonValue, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| HematiteError::Input(format!("Bad value for {what}")))
}

/// Reads `key` from `object` if present; a present value must be a number
fn optional_f64(object: &JsonValue, key: &str, name: &str) -> Result<Option<f64>> {
    if object.has_key(key) {
        required_f64(&object[key], &format!("{key} in {name}")).map(Some)
    } else {
        Ok(None)
    }
}

fn required_array<'a>(input_json: &'a JsonValue, key: &str) -> Result<&'a JsonValue> {
    let value = &input_json[key];
    if value.is_array() {
        Ok(value)
    } else {
        Err(HematiteError::Input(format!("Input json {key} field must be an array")))
    }
}

/// Parses the material from the metadata section
///
/// A missing `shear_modulus` is derived from the other two parameters.
fn parse_material(input_json: &JsonValue) -> Result<Material> {
    let metadata = &input_json["metadata"];
    let youngs_modulus = required_f64(&metadata["material_elasticity"], "material_elasticity")?;
    let poisson_ratio = required_f64(&metadata["poisson_ratio"], "poisson_ratio")?;

    if metadata.has_key("shear_modulus") {
        let shear_modulus = required_f64(&metadata["shear_modulus"], "shear_modulus")?;
        Ok(Material::new(youngs_modulus, poisson_ratio, shear_modulus))
    } else {
        Ok(Material::isotropic(youngs_modulus, poisson_ratio))
    }
}

/// Parses the optional solver section
fn parse_solver_config(input_json: &JsonValue) -> Result<SolverConfig> {
    let mut config = SolverConfig::default();
    let solver = &input_json["solver"];
    if solver.is_null() {
        return Ok(config);
    }

    if solver.has_key("method") {
        config.method = match solver["method"].as_str() {
            Some("cholesky") => SolverMethod::Cholesky,
            Some("conjugate_gradient") => SolverMethod::ConjugateGradient,
            other => {
                return Err(HematiteError::Input(format!(
                    "Unknown solver method {other:?}, expected cholesky or conjugate_gradient"
                )))
            }
        };
    }
    if solver.has_key("max_iterations") {
        config.max_iterations = solver["max_iterations"]
            .as_u64()
            .ok_or_else(|| HematiteError::Input("Bad value for max_iterations".to_owned()))?;
    }
    if solver.has_key("target_cost") {
        config.target_cost = required_f64(&solver["target_cost"], "target_cost")?;
    }
    if solver.has_key("progress") {
        config.progress = solver["progress"]
            .as_bool()
            .ok_or_else(|| HematiteError::Input("Bad value for progress".to_owned()))?;
    }

    Ok(config)
}

/// Parses `nodes` as free nodes, each an `[x, y]` pair
fn parse_nodes(input_json: &JsonValue) -> Result<Vec<Node>> {
    let nodes_json = required_array(input_json, "nodes")?;
    let mut nodes = Vec::with_capacity(nodes_json.len());
    for (i, point) in nodes_json.members().enumerate() {
        if !point.is_array() || point.len() != 2 {
            return Err(HematiteError::Input(format!(
                "Node {i} must be an [x, y] pair"
            )));
        }
        let x = required_f64(&point[0], &format!("x of node {i}"))?;
        let y = required_f64(&point[1], &format!("y of node {i}"))?;
        nodes.push(Node::free_at(x, y));
    }
    Ok(nodes)
}

fn parse_elements(input_json: &JsonValue) -> Result<Vec<[usize; 3]>> {
    let elements_json = required_array(input_json, "elements")?;
    let mut elements = Vec::with_capacity(elements_json.len());
    for (i, element) in elements_json.members().enumerate() {
        if !element.is_array() || element.len() != 3 {
            return Err(HematiteError::Input(format!(
                "Element {i} must list exactly 3 node indices"
            )));
        }
        let mut indices = [0; 3];
        for (k, index) in indices.iter_mut().enumerate() {
            *index = element[k].as_usize().ok_or_else(|| {
                HematiteError::Input(format!("Bad node index in element {i}"))
            })?;
        }
        elements.push(indices);
    }
    Ok(elements)
}

fn parse_bound(region: &JsonValue, key: &str, name: &str, default: f64) -> Result<f64> {
    Ok(optional_f64(region, key, name)?.unwrap_or(default))
}

/// Loads the boundary rules, validating that each axis has exactly one
/// prescribed quantity
fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    let conditions = &input_json["boundary_conditions"];
    if !conditions.is_null() && !conditions.is_object() {
        return Err(HematiteError::Input(
            "Input json boundary_conditions field must be an object".to_owned(),
        ));
    }

    for (name, rule_json) in conditions.entries() {
        if !rule_json.has_key("region") {
            return Err(HematiteError::Input(format!(
                "Boundary rule {name} is missing region field"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(HematiteError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        for key in ["region", "targets"] {
            if !rule_json[key].is_object() {
                return Err(HematiteError::Input(format!(
                    "Boundary rule {name} {key} field must be an object"
                )));
            }
        }

        let region_json = &rule_json["region"];
        let region = BoundaryRegion {
            x_min: parse_bound(region_json, "x_target_min", name, f64::MIN)?,
            x_max: parse_bound(region_json, "x_target_max", name, f64::MAX)?,
            y_min: parse_bound(region_json, "y_target_min", name, f64::MIN)?,
            y_max: parse_bound(region_json, "y_target_max", name, f64::MAX)?,
        };

        let targets = &rule_json["targets"];
        let target = BoundaryTarget {
            ux: optional_f64(targets, "ux", name)?,
            uy: optional_f64(targets, "uy", name)?,
            fx: optional_f64(targets, "fx", name)?,
            fy: optional_f64(targets, "fy", name)?,
        };

        if region.x_min > region.x_max {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' has x_target_min greater than x_target_max"
            )));
        }
        if region.y_min > region.y_max {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' has y_target_min greater than y_target_max"
            )));
        }
        if target.fx.is_none() && target.ux.is_none() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is under-constrained in x-axis"
            )));
        }
        if target.fy.is_none() && target.uy.is_none() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is under-constrained in y-axis"
            )));
        }
        if target.fx.is_some() && target.ux.is_some() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is over-constrained in x-axis"
            )));
        }
        if target.fy.is_some() && target.uy.is_some() {
            return Err(HematiteError::Input(format!(
                "Boundary '{name}' is over-constrained in y-axis"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_string(),
            region,
            target,
        })
    }

    Ok(rules)
}

/// Applies boundary rules in file order; a later rule wins on overlap
fn apply_boundary_conditions(rules: &[BoundaryRule], nodes: &mut [Node]) {
    for rule in rules {
        let mut matched = 0;
        for node in nodes.iter_mut() {
            if rule.region.contains(&node.position()) {
                rule.apply(node);
                matched += 1;
            }
        }
        info!("boundary rule '{}' applied to {matched} nodes", rule.name);
    }
}

/// Builds a model from a parsed input document
pub fn build_model(input_json: &JsonValue) -> Result<Model> {
    let material = parse_material(input_json)?;
    let solver_config = parse_solver_config(input_json)?;
    let mut nodes = parse_nodes(input_json)?;
    let elements = parse_elements(input_json)?;
    let rules = parse_boundary_rules(input_json)?;
    info!(
        "loaded {} nodes, {} elements and {} boundary rules",
        nodes.len(),
        elements.len(),
        rules.len()
    );

    apply_boundary_conditions(&rules, &mut nodes);

    let mut model = Model::with_material(material).with_solver_config(solver_config);
    model.add_nodes(&nodes);
    if !elements.is_empty() {
        model.add_elements(&elements)?;
    }

    Ok(model)
}

/// Reads an input file into a model ready to solve
pub fn load(input_file: &str) -> Result<Model> {
    build_model(&load_input_file(input_file)?)
}
