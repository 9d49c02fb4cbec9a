use crate::MeshError;

use serde::{Deserialize, Serialize};

/// An indexed triangle mesh with flat buffers.
///
/// `vertices` and `normals` hold `[x, y, z]` triples; every 3 entries of `indices` form one
/// triangle.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub normals: Option<Vec<f32>>,
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: &mut [f32]) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|c| *c /= norm);
    }
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex(&self, i: usize) -> [f32; 3] {
        [
            self.vertices[3 * i],
            self.vertices[3 * i + 1],
            self.vertices[3 * i + 2],
        ]
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Checks that the buffers are whole triples and every index names a vertex.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.vertices.len() % 3 != 0 {
            return Err(MeshError::Ragged {
                what: "vertex",
                len: self.vertices.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::Ragged {
                what: "index",
                len: self.indices.len(),
            });
        }
        let vertex_count = self.vertex_count();
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= vertex_count)
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.vertices.len() {
                return Err(MeshError::NormalCount {
                    expected: vertex_count,
                    actual: normals.len() / 3,
                });
            }
        }

        Ok(())
    }

    /// Sets `normals` to the unit sum of the (area weighted) face normals around each vertex.
    /// Vertices that belong to no triangle, or only to degenerate ones, get a zero normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![0.0; self.vertices.len()];
        for [a, b, c] in self.triangles() {
            let (pa, pb, pc) = (
                self.vertex(a as usize),
                self.vertex(b as usize),
                self.vertex(c as usize),
            );
            let n = cross(sub(pb, pa), sub(pc, pa));
            for &v in &[a, b, c] {
                let v = 3 * v as usize;
                normals[v] += n[0];
                normals[v + 1] += n[1];
                normals[v + 2] += n[2];
            }
        }
        normals.chunks_exact_mut(3).for_each(normalize);

        self.normals = Some(normals);
    }

    /// Maps every vertex `p` to `p * scale + offset`, e.g. from pooled voxel indices to dataset
    /// coordinates. Normals, if present, are transformed to stay perpendicular to the surface.
    pub fn scale_and_offset(&mut self, scale: [f32; 3], offset: [f32; 3]) {
        for v in self.vertices.chunks_exact_mut(3) {
            for i in 0..3 {
                v[i] = v[i] * scale[i] + offset[i];
            }
        }
        if let Some(normals) = &mut self.normals {
            for n in normals.chunks_exact_mut(3) {
                for i in 0..3 {
                    if scale[i] != 0.0 {
                        n[i] /= scale[i];
                    }
                }
                normalize(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh {
            vertices: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            normals: None,
        }
    }

    #[test]
    fn validate_catches_bad_indices() {
        let mut mesh = quad();
        assert!(mesh.validate().is_ok());

        mesh.indices.push(0);
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::Ragged { what: "index", .. })
        ));

        mesh.indices.extend_from_slice(&[1, 4]);
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::IndexOutOfRange {
                index: 4,
                vertex_count: 4
            })
        ));
    }

    #[test]
    fn flat_quad_normals_point_up() {
        let mut mesh = quad();

        mesh.compute_vertex_normals();

        assert!(mesh.validate().is_ok());
        let normals = mesh.normals.unwrap();
        for n in normals.chunks_exact(3) {
            assert_eq!(n, &[0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn scale_and_offset_moves_vertices() {
        let mut mesh = quad();
        mesh.compute_vertex_normals();

        mesh.scale_and_offset([2.0, 2.0, 2.0], [10.0, 20.0, 30.0]);

        assert_eq!(mesh.vertex(2), [12.0, 22.0, 30.0]);
        assert_eq!(&mesh.normals.unwrap()[..3], &[0.0, 0.0, 1.0]);
    }
}
