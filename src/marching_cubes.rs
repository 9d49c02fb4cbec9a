//! Table-driven marching cubes over a `DenseVolume`.

use crate::{
    marching_cubes_tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE},
    DenseVolume, Mesh, MeshError,
};

use itertools::iproduct;
use log::debug;
use std::collections::TryReserveError;

/// Differences below this are treated as equal when placing an edge crossing.
const EPSILON: f32 = 1e-5;

/// Worst case emitted per cube: one vertex per edge, 5 triangles.
const MAX_CUBE_VERTICES: usize = 12;
const MAX_CUBE_INDICES: usize = 15;

/// The point on segment `p1 -> p2` where the field (linear between `v1` and `v2`) equals
/// `isovalue`.
fn interpolate(isovalue: f32, p1: [f32; 3], p2: [f32; 3], v1: f32, v2: f32) -> [f32; 3] {
    if (isovalue - v1).abs() < EPSILON {
        return p1;
    }
    if (isovalue - v2).abs() < EPSILON {
        return p2;
    }
    if (v1 - v2).abs() < EPSILON {
        return p1;
    }

    let mu = (isovalue - v1) / (v2 - v1);

    [
        p1[0] + mu * (p2[0] - p1[0]),
        p1[1] + mu * (p2[1] - p1[1]),
        p1[2] + mu * (p2[2] - p1[2]),
    ]
}

/// Extracts the `isovalue` level set of `volume` as a triangle mesh. Vertex positions are
/// `[x, y, z]` in voxel index units.
///
/// Each cube emits its own vertices, so vertices on an edge shared by neighboring cubes are
/// duplicated rather than welded.
pub fn extract(volume: &DenseVolume, isovalue: f32) -> Result<Mesh, MeshError> {
    let [dz, dy, dx] = volume.dims();
    if dz < 2 || dy < 2 || dx < 2 {
        return Ok(Mesh::default());
    }

    let cubes = (dz - 1) * (dy - 1) * (dx - 1);
    let alloc_err = |_: TryReserveError| MeshError::Allocation { cubes };
    let max_vertices = cubes
        .checked_mul(MAX_CUBE_VERTICES)
        .filter(|&n| n <= u32::MAX as usize)
        .ok_or(MeshError::Allocation { cubes })?;

    let mut vertices: Vec<f32> = Vec::new();
    vertices.try_reserve_exact(3 * max_vertices).map_err(alloc_err)?;
    let mut indices: Vec<u32> = Vec::new();
    indices
        .try_reserve_exact(cubes * MAX_CUBE_INDICES)
        .map_err(alloc_err)?;

    for (z, y, x) in iproduct!(0..dz - 1, 0..dy - 1, 0..dx - 1) {
        let mut values = [0.0; 8];
        let mut corners = [[0.0; 3]; 8];
        let mut case = 0;
        for (i, [ox, oy, oz]) in CORNER_OFFSETS.iter().copied().enumerate() {
            let (cx, cy, cz) = (x + ox, y + oy, z + oz);
            values[i] = volume.get(cz, cy, cx);
            corners[i] = [cx as f32, cy as f32, cz as f32];
            if values[i] < isovalue {
                case |= 1 << i;
            }
        }

        let crossed = EDGE_TABLE[case];
        if crossed == 0 {
            continue;
        }

        let mut edge_vertex = [0u32; 12];
        for (e, [a, b]) in EDGE_CORNERS.iter().copied().enumerate() {
            if crossed & (1 << e) == 0 {
                continue;
            }
            let p = interpolate(isovalue, corners[a], corners[b], values[a], values[b]);
            edge_vertex[e] = (vertices.len() / 3) as u32;
            vertices.extend_from_slice(&p);
        }

        for tri in TRI_TABLE[case]
            .chunks_exact(3)
            .take_while(|tri| tri[0] != -1)
        {
            indices.extend(tri.iter().map(|&e| edge_vertex[e as usize]));
        }
    }

    vertices.shrink_to_fit();
    indices.shrink_to_fit();
    debug!(
        "Marched {} cubes at {}: {} vertices, {} triangles",
        cubes,
        isovalue,
        vertices.len() / 3,
        indices.len() / 3
    );

    Ok(Mesh {
        vertices,
        indices,
        normals: None,
    })
}
