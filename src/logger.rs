use std::fmt::{Display, Write};

use crate::{
    arch::{Architecture, LayerSpec},
    error::ConfigurationError,
    shape::Shape,
};

pub fn ansi<T: Display, U: Display>(x: T, y: U) -> String {
    format!("\x1b[{y}m{x}\x1b[0m")
}

/// One line per operation with the shape it produces, residual blocks indented.
pub fn summary(arch: &Architecture, input: Shape) -> Result<String, ConfigurationError> {
    let mut out = String::new();
    write_layers(&mut out, arch, input, 0)?;
    Ok(out)
}

fn write_layers(out: &mut String, arch: &Architecture, mut shape: Shape, depth: usize) -> Result<Shape, ConfigurationError> {
    let indent = "  ".repeat(depth);

    for layer in arch.layers() {
        let next = layer.output_shape(shape)?;
        let name = format!("{indent}{}", layer.name());
        let _ = writeln!(out, "{name: <48} {}", ansi(next, 36));

        if let LayerSpec::Residual(block) = layer {
            let _ = writeln!(out, "{indent}  main:");
            write_layers(out, &block.main, shape, depth + 2)?;

            if block.has_identity_shortcut() {
                let _ = writeln!(out, "{indent}  shortcut: identity");
            } else {
                let _ = writeln!(out, "{indent}  shortcut:");
                write_layers(out, &block.shortcut, shape, depth + 2)?;
            }
        }

        shape = next;
    }

    Ok(shape)
}

#[cfg(test)]
mod tests {
    use crate::arch::{residual_block, ConvolutionSpec};

    use super::*;

    #[test]
    fn lists_nested_layers() {
        let arch = Architecture::from(vec![
            LayerSpec::Residual(residual_block(1, &[2], &[3], false, 0.0).unwrap()),
            LayerSpec::MaxPool { kernel_size: 2, stride: 2 },
            LayerSpec::Conv(ConvolutionSpec::same(2, 2, 1).unwrap()),
        ]);

        let text = summary(&arch, Shape::new(1, 4, 4)).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Residual"));
        assert!(lines[2].trim_start().starts_with("Conv(1 -> 2"));
        assert!(lines[4].trim_start().starts_with("Conv(1 -> 2, k=1"));
        assert!(lines[5].contains("2 x 2 x 2"));
    }
}
