use std::{
    fs::File,
    io::{BufWriter, Write},
};

use log::info;

use crate::{error::Result, model::Model};

/// Writes nodal results as `x,y,ux,uy,fx,fy`
pub fn write_nodes<W: Write>(model: &Model, out: &mut W) -> Result<()> {
    writeln!(out, "x,y,ux,uy,fx,fy")?;
    for node in model.nodes() {
        writeln!(
            out,
            "{x},{y},{ux},{uy},{fx},{fy}",
            x = node.pos_x(),
            y = node.pos_y(),
            ux = node.disp_x(),
            uy = node.disp_y(),
            fx = node.force_x(),
            fy = node.force_y(),
        )?;
    }
    Ok(())
}

/// Writes element connectivity and stress as `n0,n1,n2,sxx,syy,sxy,von_mises`
///
/// Elements without a solved stress get empty stress columns.
pub fn write_elements<W: Write>(model: &Model, out: &mut W) -> Result<()> {
    writeln!(out, "n0,n1,n2,sxx,syy,sxy,von_mises")?;
    for element in model.elements() {
        let [n0, n1, n2] = element.node_indices();
        match element.stress() {
            Some(stress) => writeln!(
                out,
                "{n0},{n1},{n2},{sxx},{syy},{sxy},{vm}",
                sxx = stress.xx,
                syy = stress.yy,
                sxy = stress.xy,
                vm = stress.von_mises(),
            )?,
            None => writeln!(out, "{n0},{n1},{n2},,,,")?,
        }
    }
    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `model` - A solved model
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(model: &Model, nodes_output: &str, elements_output: &str) -> Result<()> {
    let mut nodes_file = BufWriter::new(File::create(nodes_output)?);
    write_nodes(model, &mut nodes_file)?;
    nodes_file.flush()?;

    let mut elements_file = BufWriter::new(File::create(elements_output)?);
    write_elements(model, &mut elements_file)?;
    elements_file.flush()?;

    info!("wrote output to {} and {}", nodes_output, elements_output);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Node;

    #[test]
    fn unsolved_elements_have_empty_stress() {
        let mut model = Model::new(1.0, 0.25, 0.4);
        model.add_nodes(&[
            Node::zero_at(0.0, 0.0),
            Node::zero_at(1.0, 0.0),
            Node::zero_at(0.0, 1.0),
        ]);
        model.add_elements(&[[0, 1, 2]]).unwrap();

        let mut out = Vec::new();
        write_elements(&model, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "n0,n1,n2,sxx,syy,sxy,von_mises\n0,1,2,,,,\n"
        );
    }

    #[test]
    fn node_rows_follow_header() {
        let mut model = Model::new(1.0, 0.25, 0.4);
        let mut node = Node::free_at(1.5, -2.0);
        node.set_force_y(3.0);
        model.add_nodes(&[node]);

        let mut out = Vec::new();
        write_nodes(&model, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "x,y,ux,uy,fx,fy\n1.5,-2,0,0,0,3\n"
        );
    }
}
