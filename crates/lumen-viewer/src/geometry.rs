use glam::Vec3;

/// Corners of a unit cube centered on the origin.
const CORNERS: [Vec3; 8] = [
    Vec3::new(-0.5, -0.5, -0.5),
    Vec3::new(0.5, -0.5, -0.5),
    Vec3::new(0.5, 0.5, -0.5),
    Vec3::new(-0.5, 0.5, -0.5),
    Vec3::new(-0.5, -0.5, 0.5),
    Vec3::new(0.5, -0.5, 0.5),
    Vec3::new(0.5, 0.5, 0.5),
    Vec3::new(-0.5, 0.5, 0.5),
];

/// Two counter-clockwise triangles per face, indexing `CORNERS`.
const TRIANGLES: [[usize; 3]; 12] = [
    [4, 5, 6], [4, 6, 7], // +z
    [1, 0, 3], [1, 3, 2], // -z
    [5, 1, 2], [5, 2, 6], // +x
    [0, 4, 7], [0, 7, 3], // -x
    [7, 6, 2], [7, 2, 3], // +y
    [0, 1, 5], [0, 5, 4], // -y
];

/// Unit cube as a triangle list: (positions, colors).
///
/// Each corner keeps its own color, so faces blend between their corners.
/// Draws are non-indexed, so the triangles are expanded rather than indexed.
pub fn colored_cube() -> (Vec<f32>, Vec<f32>) {
    let mut positions = Vec::with_capacity(TRIANGLES.len() * 9);
    let mut colors = Vec::with_capacity(TRIANGLES.len() * 9);

    for corner in TRIANGLES.iter().flatten().map(|&i| CORNERS[i]) {
        positions.extend(corner.to_array());
        // maps [-0.5, 0.5] to [0, 1] per channel
        colors.extend((corner + Vec3::splat(0.5)).to_array());
    }
    (positions, colors)
}
