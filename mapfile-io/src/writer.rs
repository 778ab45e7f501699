use std::io::{self, Write};

use mapfile_core::{
    document::{CURRENT_MAP_VERSION, MapFile},
    entity::MapEntity,
    primitive::{MapBrush, MapPatch, PatchVertex, Primitive},
    properties::PropertySet,
};

/// 以当前格式（`Version 2`、`brushDef3`、`patchDef2/3`）写出整个文档。
///
/// 浮点数使用最短往返表示，重新解析后得到完全相同的位模式。
pub fn write_map<W: Write>(map: &MapFile, out: &mut W) -> io::Result<()> {
    writeln!(out, "Version {CURRENT_MAP_VERSION}")?;
    for (index, entity) in map.entities().enumerate() {
        write_entity(entity, index, out)?;
    }
    Ok(())
}

/// 写出到内存字符串，便于测试与差异比较。
pub fn map_to_string(map: &MapFile) -> io::Result<String> {
    let mut buffer = Vec::new();
    write_map(map, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn write_entity<W: Write>(entity: &MapEntity, index: usize, out: &mut W) -> io::Result<()> {
    writeln!(out, "// entity {index}")?;
    writeln!(out, "{{")?;
    write_properties(&entity.properties, "", out)?;
    for (number, primitive) in entity.primitives().iter().enumerate() {
        writeln!(out, "// primitive {number}")?;
        writeln!(out, "{{")?;
        match primitive {
            Primitive::Brush(brush) => write_brush(brush, out)?,
            Primitive::Patch(patch) => write_patch(patch, out)?,
        }
        writeln!(out, "}}")?;
    }
    writeln!(out, "}}")
}

fn write_brush<W: Write>(brush: &MapBrush, out: &mut W) -> io::Result<()> {
    writeln!(out, " brushDef3")?;
    writeln!(out, " {{")?;
    write_properties(&brush.properties, "  ", out)?;
    for side in brush.sides() {
        let [a, b, c, d] = side.plane.coefficients();
        let [s, t] = side.texture_matrix;
        writeln!(
            out,
            "  ( {a} {b} {c} {d} ) ( ( {} {} {} ) ( {} {} {} ) ) {} 0 0 0",
            s.x,
            s.y,
            s.z,
            t.x,
            t.y,
            t.z,
            quoted(&side.material)?
        )?;
    }
    writeln!(out, " }}")
}

fn write_patch<W: Write>(patch: &MapPatch, out: &mut W) -> io::Result<()> {
    let width = patch.surface.width();
    let height = patch.surface.height();
    if patch.explicit_subdivisions {
        writeln!(out, " patchDef3")?;
        writeln!(out, " {{")?;
        writeln!(out, "  {}", quoted(&patch.material)?)?;
        writeln!(
            out,
            "  ( {width} {height} {} {} 0 0 0 )",
            patch.horz_subdivisions, patch.vert_subdivisions
        )?;
    } else {
        writeln!(out, " patchDef2")?;
        writeln!(out, " {{")?;
        writeln!(out, "  {}", quoted(&patch.material)?)?;
        writeln!(out, "  ( {width} {height} 0 0 0 )")?;
    }

    // 按列写出，每列自上而下
    writeln!(out, "  (")?;
    for column in 0..width {
        write!(out, "   (")?;
        for row in 0..height {
            let vertex = patch
                .surface
                .vertex(row, column)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "曲面控制点缺失"))?;
            write_patch_vertex(vertex, out)?;
        }
        writeln!(out, " )")?;
    }
    writeln!(out, "  )")?;
    writeln!(out, " }}")?;
    write_properties(&patch.properties, " ", out)
}

fn write_patch_vertex<W: Write>(vertex: &PatchVertex, out: &mut W) -> io::Result<()> {
    let PatchVertex { xyz, st, color } = vertex;
    write!(out, " ( {} {} {} {} {}", xyz.x, xyz.y, xyz.z, st.x, st.y)?;
    if *color != PatchVertex::WHITE {
        let [r, g, b, a] = color;
        write!(out, " {r} {g} {b} {a}")?;
    }
    write!(out, " )")
}

fn write_properties<W: Write>(
    properties: &PropertySet,
    indent: &str,
    out: &mut W,
) -> io::Result<()> {
    for (key, value) in properties.iter() {
        writeln!(out, "{indent}{} {}", quoted(key)?, quoted(value)?)?;
    }
    Ok(())
}

/// 文本格式不支持转义，含引号或换行的字符串无法写出。
fn quoted(text: &str) -> io::Result<String> {
    if text.contains(['"', '\n', '\r']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("字符串无法写入地图文件（含引号或换行）: {text:?}"),
        ));
    }
    Ok(format!("\"{text}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use mapfile_core::{
        document::MapVersion,
        geometry::Plane,
        primitive::{BrushSide, PatchSurface},
    };

    fn single_entity_map(entity: MapEntity) -> MapFile {
        MapFile::from_parts(MapVersion::Current, vec![entity])
    }

    #[test]
    fn writes_version_header_and_entity_markers() {
        let mut world = MapEntity::with_classname("worldspawn");
        world.properties.set("message", "hello world");
        let text = map_to_string(&single_entity_map(world)).expect("写出失败");
        assert_eq!(
            text,
            "Version 2\n// entity 0\n{\n\"classname\" \"worldspawn\"\n\"message\" \"hello world\"\n}\n"
        );
    }

    #[test]
    fn writes_brush_sides_in_current_grammar() {
        let mut brush = MapBrush::new();
        brush.properties.set("editor_group", "3");
        brush.add_side(BrushSide::new(
            Plane::new(Vec3::Z, 64.0),
            "textures/base/floor",
            [Vec3::new(0.0078125, 0.0, 0.5), Vec3::new(0.0, 0.0078125, 0.0)],
        ));
        let mut world = MapEntity::with_classname("worldspawn");
        world.add_primitive(brush);
        let text = map_to_string(&single_entity_map(world)).expect("写出失败");
        let expected = "Version 2\n// entity 0\n{\n\"classname\" \"worldspawn\"\n// primitive 0\n{\n brushDef3\n {\n  \"editor_group\" \"3\"\n  ( 0 0 1 -64 ) ( ( 0.0078125 0 0.5 ) ( 0 0.0078125 0 ) ) \"textures/base/floor\" 0 0 0\n }\n}\n}\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn patch_grammar_follows_explicit_flag() {
        let verts = vec![
            PatchVertex::new(Vec3::new(0.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
            PatchVertex::new(Vec3::new(8.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
        ];
        let surface = PatchSurface::from_vertices(2, 1, verts).expect("2x1");
        let mut patch = MapPatch::new(surface, "textures/curve");
        patch.properties.set("note", "x");

        let mut world = MapEntity::with_classname("worldspawn");
        world.add_primitive(patch.clone());
        let text = map_to_string(&single_entity_map(world)).expect("写出失败");
        assert!(text.contains(" patchDef2\n {\n  \"textures/curve\"\n  ( 2 1 0 0 0 )\n"));
        // 宽 2 高 1：两列，每列一个控制点
        assert!(text.contains("  (\n   ( ( 0 0 0 0 0 ) )\n   ( ( 8 0 0 1 0 ) )\n  )\n }\n \"note\" \"x\"\n}\n"));

        patch.set_subdivisions(6, 3);
        if let Some(vertex) = patch.surface.vertex_mut(0, 1) {
            vertex.color = [10, 20, 30, 40];
        }
        let mut world = MapEntity::with_classname("worldspawn");
        world.add_primitive(patch);
        let text = map_to_string(&single_entity_map(world)).expect("写出失败");
        assert!(text.contains(" patchDef3\n"));
        assert!(text.contains("  ( 2 1 6 3 0 0 0 )\n"));
        assert!(text.contains("( 8 0 0 1 0 10 20 30 40 )"));
    }

    #[test]
    fn rejects_unwritable_strings() {
        let mut world = MapEntity::with_classname("worldspawn");
        world.properties.set("message", "say \"hi\"");
        let err = map_to_string(&single_entity_map(world)).expect_err("应当拒绝引号");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut world = MapEntity::with_classname("worldspawn");
        world.properties.set("line\nbreak", "x");
        assert!(map_to_string(&single_entity_map(world)).is_err());
    }
}
