use std::path::Path;

use super::MeshError;

/// File suffix accepted by [`load_obj`].
pub const OBJ_EXTENSION: &str = "obj";

/// Reads and parses an OBJ file. Fails with `UnsupportedFormat` for any other
/// suffix, without touching the file.
pub fn load_obj(path: &Path) -> Result<Vec<f32>, MeshError> {
    if path.extension().and_then(|e| e.to_str()) != Some(OBJ_EXTENSION) {
        return Err(MeshError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let positions = parse_obj(&text)?;
    log::debug!(
        "loaded {} ({} triangles)",
        path.display(),
        positions.len() / 9
    );
    Ok(positions)
}

/// Parses OBJ text into flat triangle positions (9 floats per triangle).
///
/// Faces are fan-triangulated around their first vertex. Each face reference
/// may be `i`, `i/t`, `i//n` or `i/t/n`; only `i` is used. Negative indices are
/// relative to the vertices defined so far. Other records are ignored.
pub fn parse_obj(text: &str) -> Result<Vec<f32>, MeshError> {
    let mut vertices: Vec<[f32; 3]> = Vec::new();
    let mut out = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let mut tokens = raw.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let mut xyz = [0.0f32; 3];
                for slot in &mut xyz {
                    let token = tokens.next().ok_or_else(|| MeshError::Parse {
                        line,
                        message: "vertex needs three coordinates".to_string(),
                    })?;
                    *slot = token.parse().map_err(|_| MeshError::Parse {
                        line,
                        message: format!("invalid coordinate `{token}`"),
                    })?;
                }
                vertices.push(xyz);
            }
            Some("f") => {
                let face = tokens
                    .map(|t| resolve_index(t, line, vertices.len()))
                    .collect::<Result<Vec<_>, _>>()?;

                if face.len() < 3 {
                    return Err(MeshError::Parse {
                        line,
                        message: format!("face needs at least 3 vertices, got {}", face.len()),
                    });
                }

                for k in 1..face.len() - 1 {
                    for idx in [face[0], face[k], face[k + 1]] {
                        out.extend_from_slice(&vertices[idx]);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Turns a face reference into a 0-based vertex index.
fn resolve_index(token: &str, line: usize, vertex_count: usize) -> Result<usize, MeshError> {
    let head = token.split('/').next().unwrap_or(token);
    let index: i64 = head.parse().map_err(|_| MeshError::Parse {
        line,
        message: format!("invalid face reference `{token}`"),
    })?;

    let out_of_range = || MeshError::FaceIndex {
        line,
        index,
        vertex_count,
    };

    let resolved = match index {
        0 => return Err(out_of_range()),
        i if i > 0 => i - 1,
        i => vertex_count as i64 + i,
    };

    usize::try_from(resolved)
        .ok()
        .filter(|&r| r < vertex_count)
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

    #[test]
    fn quad_is_fan_triangulated() {
        let p = parse_obj(QUAD).unwrap();
        assert_eq!(p.len(), 18);
        assert_eq!(
            p,
            vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ]
        );
        // both triangles start at vertex 1
        assert_eq!(&p[0..3], &p[9..12]);
    }

    #[test]
    fn slash_references_use_position_index() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\nf 1/1/1 2/1/1 3//1\n";
        let p = parse_obj(text).unwrap();
        assert_eq!(p, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn negative_indices_are_relative() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        assert_eq!(parse_obj(text).unwrap().len(), 9);
    }

    #[test]
    fn unknown_records_are_ignored() {
        let text = "o thing\ns off\nusemtl red\n\nv 0 0 0\n";
        assert!(parse_obj(text).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_face_is_rejected() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, MeshError::FaceIndex { line: 2, index: 2, vertex_count: 1 }));
    }

    #[test]
    fn degenerate_face_is_rejected() {
        let err = parse_obj("v 0 0 0\nv 1 0 0\nf 1 2\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 3, .. }));
    }

    #[test]
    fn bad_coordinate_is_rejected() {
        assert!(matches!(
            parse_obj("v 0 zero 0\n").unwrap_err(),
            MeshError::Parse { line: 1, .. }
        ));
    }

    #[test]
    fn only_obj_suffix_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let stl = dir.path().join("quad.stl");
        std::fs::write(&stl, QUAD).unwrap();
        assert!(matches!(load_obj(&stl), Err(MeshError::UnsupportedFormat { .. })));

        let obj = dir.path().join("quad.obj");
        std::fs::write(&obj, QUAD).unwrap();
        assert_eq!(load_obj(&obj).unwrap().len(), 18);
    }
}
