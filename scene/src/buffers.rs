use cgmath::Point3;

/// Shared vertex positions and triangle indices referenced by geometry nodes.
///
/// Nodes never own geometry; they reference a range of `indices` through
/// `index_buffer_index` and `num_triangles`.
#[derive(Debug, Clone, Default)]
pub struct GeometryBuffers {
    pub positions: Vec<Point3<f32>>,
    pub indices: Vec<u32>,
}

impl GeometryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a triangle list and returns `(index_buffer_index, num_triangles)`.
    ///
    /// Indices are relative to `positions` and get rebased onto the shared buffer.
    pub fn push_triangles(&mut self, positions: &[Point3<f32>], indices: &[u32]) -> (u32, u32) {
        let vertex_offset = self.positions.len() as u32;
        let index_offset = self.indices.len() as u32;

        self.positions.extend_from_slice(positions);
        self.indices.extend(indices.iter().map(|i| i + vertex_offset));

        (index_offset, (indices.len() / 3) as u32)
    }

    /// Returns the three vertex positions of triangle `triangle` in the range starting
    /// at `index_buffer_index`, or None if any index falls outside the buffers.
    pub fn triangle(&self, index_buffer_index: u32, triangle: u32) -> Option<[Point3<f32>; 3]> {
        let base = index_buffer_index as usize + 3 * triangle as usize;
        let corners = self.indices.get(base..base + 3)?;
        Some([
            *self.positions.get(corners[0] as usize)?,
            *self.positions.get(corners[1] as usize)?,
            *self.positions.get(corners[2] as usize)?,
        ])
    }

    /// Returns true if the whole triangle range lies inside the index buffer.
    pub fn contains_range(&self, index_buffer_index: u32, num_triangles: u32) -> bool {
        let end = index_buffer_index as usize + 3 * num_triangles as usize;
        end <= self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Point3<f32>>, Vec<u32>) {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        (positions, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn test_push_triangles_rebases_indices() {
        let mut buffers = GeometryBuffers::new();
        let (positions, indices) = quad();

        let first = buffers.push_triangles(&positions, &indices);
        let second = buffers.push_triangles(&positions, &indices);

        assert_eq!(first, (0, 2));
        assert_eq!(second, (6, 2));
        assert_eq!(&buffers.indices[6..9], &[4, 5, 6]);
        assert_eq!(buffers.triangle_count(), 4);
    }

    #[test]
    fn test_triangle_lookup() {
        let mut buffers = GeometryBuffers::new();
        let (positions, indices) = quad();
        let (start, _) = buffers.push_triangles(&positions, &indices);

        let triangle = buffers.triangle(start, 1).unwrap();
        assert_eq!(triangle[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(triangle[1], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(triangle[2], Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_triangle_out_of_range() {
        let mut buffers = GeometryBuffers::new();
        let (positions, indices) = quad();
        buffers.push_triangles(&positions, &indices);

        assert!(buffers.triangle(0, 2).is_none());
        assert!(buffers.contains_range(0, 2));
        assert!(!buffers.contains_range(3, 2));
    }

    #[test]
    fn test_triangle_with_bad_vertex_index() {
        let buffers = GeometryBuffers {
            positions: vec![Point3::new(0.0, 0.0, 0.0)],
            indices: vec![0, 0, 9],
        };
        assert!(buffers.triangle(0, 0).is_none());
    }
}
