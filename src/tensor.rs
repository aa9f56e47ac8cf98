use crate::{error::ShapeMismatchError, shape::Shape};

/// A batch of values laid out sample-major, then `channels x height x width`.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    batch_size: usize,
    values: Vec<f32>,
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tensor[{}; {}]", self.shape, self.batch_size)
    }
}

impl Tensor {
    pub fn zeroed(shape: Shape, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Cannot have batch size 0!");
        Self { shape, batch_size, values: vec![0.0; shape.size() * batch_size] }
    }

    pub fn from_vec(shape: Shape, batch_size: usize, values: Vec<f32>) -> Result<Self, ShapeMismatchError> {
        if batch_size == 0 || values.len() != shape.size() * batch_size {
            return Err(ShapeMismatchError::new(
                "tensor values",
                format!("{} values for [{shape}; {batch_size}]", shape.size() * batch_size),
                values.len(),
            ));
        }

        Ok(Self { shape, batch_size, values })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Full `(batch, channels, height, width)` dimensions.
    pub fn dims(&self) -> [usize; 4] {
        [self.batch_size, self.shape.channels(), self.shape.height(), self.shape.width()]
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn sample(&self, index: usize) -> &[f32] {
        let size = self.shape.size();
        &self.values[index * size..(index + 1) * size]
    }

    pub fn samples(&self) -> std::slice::ChunksExact<'_, f32> {
        self.values.chunks_exact(self.shape.size())
    }

    pub fn samples_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        let size = self.shape.size();
        self.values.chunks_exact_mut(size)
    }

    /// Reinterprets each sample with a new shape of the same size.
    pub fn reshape(mut self, shape: Shape) -> Result<Self, ShapeMismatchError> {
        if shape.size() != self.shape.size() {
            return Err(ShapeMismatchError::new("reshape", self.shape, shape));
        }

        self.shape = shape;
        Ok(self)
    }

    /// Flattens each sample into a feature vector.
    pub fn flatten(self) -> Self {
        let shape = Shape::flat(self.shape.size());
        Self { shape, ..self }
    }

    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        for x in &mut self.values {
            *x = f(*x);
        }

        self
    }

    pub fn add_assign(&mut self, rhs: &Self) -> Result<(), ShapeMismatchError> {
        self.check_same_dims("elementwise add", rhs)?;

        for (a, &b) in self.values.iter_mut().zip(rhs.values.iter()) {
            *a += b;
        }

        Ok(())
    }

    pub fn check_same_dims(&self, context: &'static str, other: &Self) -> Result<(), ShapeMismatchError> {
        if self.dims() == other.dims() {
            Ok(())
        } else {
            Err(ShapeMismatchError::new(context, format!("{:?}", self.dims()), format!("{:?}", other.dims())))
        }
    }
}
