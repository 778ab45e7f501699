use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use mapfile_core::document::MapFile;
use mapfile_core::entity::MapEntity;
use mapfile_core::primitive::{MapBrush, MapPatch, Primitive};
use mapfile_core::properties::PropertySet;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GoldenMap {
    version: u32,
    entities: Vec<GoldenEntity>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GoldenEntity {
    properties: Vec<[String; 2]>,
    #[serde(default)]
    primitives: Vec<GoldenPrimitive>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GoldenPrimitive {
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<[String; 2]>,
    data: Value,
}

pub fn assert_golden(name: &str, map: &MapFile) {
    let snapshot = GoldenMap::from_map(map);
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/golden");
    if let Err(err) = fs::create_dir_all(&base_dir) {
        panic!("无法创建黄金数据目录 {}: {err}", base_dir.display());
    }
    let golden_path = base_dir.join(format!("{name}.json"));
    let serialized = serde_json::to_string_pretty(&snapshot).expect("序列化黄金快照失败");

    if !golden_path.exists() {
        fs::write(&golden_path, &serialized)
            .unwrap_or_else(|err| panic!("写入黄金文件 {} 失败: {err}", golden_path.display()));
        panic!(
            "黄金文件 {} 不存在，已自动生成。请确认内容后重新运行测试。",
            golden_path.display()
        );
    }

    let expected_str = fs::read_to_string(&golden_path)
        .unwrap_or_else(|err| panic!("读取黄金文件 {} 失败: {err}", golden_path.display()));
    let expected: GoldenMap = serde_json::from_str(&expected_str)
        .unwrap_or_else(|err| panic!("解析黄金文件 {} 失败: {err}", golden_path.display()));

    if expected != snapshot {
        let diff_path = base_dir.join(format!("{name}.actual.json"));
        fs::write(&diff_path, &serialized).expect("写入差异文件失败");
        panic!(
            "黄金文件 {} 与当前解析结果不一致。已生成对照输出 {}。",
            golden_path.display(),
            diff_path.display()
        );
    }
}

impl GoldenMap {
    fn from_map(map: &MapFile) -> Self {
        Self {
            version: map.version().number(),
            entities: map.entities().map(golden_entity).collect(),
        }
    }
}

fn golden_entity(entity: &MapEntity) -> GoldenEntity {
    GoldenEntity {
        properties: golden_properties(&entity.properties),
        primitives: entity.primitives().iter().map(golden_primitive).collect(),
    }
}

fn golden_primitive(primitive: &Primitive) -> GoldenPrimitive {
    let (kind, data) = match primitive {
        Primitive::Brush(brush) => ("brush", brush_data(brush)),
        Primitive::Patch(patch) => ("patch", patch_data(patch)),
    };
    GoldenPrimitive {
        kind: kind.to_string(),
        properties: golden_properties(primitive.properties()),
        data,
    }
}

fn brush_data(brush: &MapBrush) -> Value {
    let sides: Vec<Value> = brush
        .sides()
        .iter()
        .map(|side| {
            let [s, t] = side.texture_matrix;
            json!({
                "plane": side.plane.coefficients().map(f64::from),
                "texture_matrix": [
                    [s.x as f64, s.y as f64, s.z as f64],
                    [t.x as f64, t.y as f64, t.z as f64],
                ],
                "material": side.material,
            })
        })
        .collect();
    json!({ "sides": sides })
}

fn patch_data(patch: &MapPatch) -> Value {
    let vertices: Vec<Value> = patch
        .surface
        .vertices()
        .iter()
        .map(|vertex| {
            json!([
                vertex.xyz.x as f64,
                vertex.xyz.y as f64,
                vertex.xyz.z as f64,
                vertex.st.x as f64,
                vertex.st.y as f64,
            ])
        })
        .collect();
    json!({
        "material": patch.material,
        "width": patch.surface.width(),
        "height": patch.surface.height(),
        "subdivisions": [patch.horz_subdivisions, patch.vert_subdivisions],
        "explicit_subdivisions": patch.explicit_subdivisions,
        "vertices": vertices,
    })
}

fn golden_properties(properties: &PropertySet) -> Vec<[String; 2]> {
    properties
        .iter()
        .map(|(key, value)| [key.to_string(), value.to_string()])
        .collect()
}
