pub mod geometry {
    use glam::{Vec3, Vec4};
    use serde::{Deserialize, Serialize};

    /// 半空间平面：`normal · p = dist`。
    ///
    /// 文件中以四个系数 `a b c d`（`ax + by + cz + d = 0`）保存，
    /// 因此 `d = -dist`。取反是精确运算，往返不会改变位模式。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Plane {
        pub normal: Vec3,
        pub dist: f32,
    }

    impl Plane {
        /// 刚构造时的“未设置”哨兵值。
        pub const ZERO: Plane = Plane {
            normal: Vec3::ZERO,
            dist: 0.0,
        };

        #[inline]
        pub fn new(normal: Vec3, dist: f32) -> Self {
            Self { normal, dist }
        }

        #[inline]
        pub fn from_coefficients(coefficients: [f32; 4]) -> Self {
            let [a, b, c, d] = coefficients;
            Self {
                normal: Vec3::new(a, b, c),
                dist: -d,
            }
        }

        #[inline]
        pub fn coefficients(self) -> [f32; 4] {
            [self.normal.x, self.normal.y, self.normal.z, -self.dist]
        }

        /// 由三个边界点构造平面，法线为 `(p1 - p2) × (p3 - p2)` 归一化。
        /// 三点共线时返回 `None`。
        pub fn from_points(p1: Vec3, p2: Vec3, p3: Vec3) -> Option<Self> {
            let normal = (p1 - p2).cross(p3 - p2).try_normalize()?;
            Some(Self {
                normal,
                dist: normal.dot(p2),
            })
        }

        #[inline]
        pub fn is_zero(self) -> bool {
            self.normal == Vec3::ZERO && self.dist == 0.0
        }

        /// 返回单位法线形式；法线长度为零时返回 `None`。
        pub fn normalized(self) -> Option<Self> {
            let length = self.normal.length();
            if length <= f32::EPSILON || !length.is_finite() {
                return None;
            }
            Some(Self {
                normal: self.normal / length,
                dist: self.dist / length,
            })
        }

        #[inline]
        pub fn distance_to(self, point: Vec3) -> f32 {
            self.normal.dot(point) - self.dist
        }
    }

    /// 根据平面法线求纹理投影的 S/T 基轴。
    ///
    /// 先把接近零的分量钳为零，再以两次旋转把 (0,1,0)/(0,0,-1) 转到平面上。
    pub fn texture_axis_base(normal: Vec3) -> (Vec3, Vec3) {
        let clean = |value: f32| if value.abs() < 1e-6 { 0.0 } else { value };
        let n = Vec3::new(clean(normal.x), clean(normal.y), clean(normal.z));

        let rot_y = -n.z.atan2((n.y * n.y + n.x * n.x).sqrt());
        let rot_z = n.y.atan2(n.x);

        let (sin_z, cos_z) = rot_z.sin_cos();
        let (sin_y, cos_y) = rot_y.sin_cos();

        let tex_s = Vec3::new(-sin_z, cos_z, 0.0);
        let tex_t = Vec3::new(-sin_y * cos_z, -sin_y * sin_z, -cos_y);
        (tex_s, tex_t)
    }

    /// 由 2×3 纹理矩阵与平面法线生成两条 4 分量纹理轴（xyz 为方向，w 为偏移）。
    pub fn texture_vectors(normal: Vec3, matrix: &[Vec3; 2], origin: Vec3) -> [Vec4; 2] {
        let (tex_s, tex_t) = texture_axis_base(normal);
        let axis = |row: Vec3| {
            let direction = tex_s * row.x + tex_t * row.y;
            direction.extend(row.z + origin.dot(direction))
        };
        [axis(matrix[0]), axis(matrix[1])]
    }
}

pub mod properties {
    use glam::Vec3;
    use serde::{Deserialize, Serialize};

    /// 键值属性集合。键区分大小写且唯一，重复写入时后者覆盖前者。
    ///
    /// 内部保留首次插入的顺序，只用于让输出稳定；比较时不考虑顺序。
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct PropertySet {
        pairs: Vec<(String, String)>,
    }

    impl PropertySet {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.pairs.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.pairs.is_empty()
        }

        /// 写入键值，返回被覆盖的旧值。
        pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
            let key = key.into();
            let value = value.into();
            match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, slot)) => Some(std::mem::replace(slot, value)),
                None => {
                    self.pairs.push((key, value));
                    None
                }
            }
        }

        pub fn get(&self, key: &str) -> Option<&str> {
            self.pairs
                .iter()
                .find(|(existing, _)| existing == key)
                .map(|(_, value)| value.as_str())
        }

        #[inline]
        pub fn contains_key(&self, key: &str) -> bool {
            self.get(key).is_some()
        }

        pub fn remove(&mut self, key: &str) -> Option<String> {
            let index = self.pairs.iter().position(|(existing, _)| existing == key)?;
            Some(self.pairs.remove(index).1)
        }

        pub fn clear(&mut self) {
            self.pairs.clear();
        }

        pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
            self.pairs
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
        }

        /// 遍历以 `prefix` 开头的键。
        pub fn match_prefix<'a>(
            &'a self,
            prefix: &'a str,
        ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
            self.iter().filter(move |(key, _)| key.starts_with(prefix))
        }

        pub fn get_float(&self, key: &str) -> Option<f32> {
            self.get(key)?.trim().parse::<f32>().ok()
        }

        pub fn get_int(&self, key: &str) -> Option<i32> {
            self.get(key)?.trim().parse::<i32>().ok()
        }

        /// 数值非零或文本为 `true` 时视为真；缺失的键为假。
        pub fn get_bool(&self, key: &str) -> bool {
            match self.get(key).map(str::trim) {
                Some(value) if value.eq_ignore_ascii_case("true") => true,
                Some(value) => value.parse::<f32>().map(|v| v != 0.0).unwrap_or(false),
                None => false,
            }
        }

        pub fn get_vector(&self, key: &str) -> Option<Vec3> {
            self.get(key).map(parse_vector)
        }
    }

    impl PartialEq for PropertySet {
        fn eq(&self, other: &Self) -> bool {
            self.len() == other.len()
                && self
                    .iter()
                    .all(|(key, value)| other.get(key) == Some(value))
        }
    }

    /// 解析以空白分隔的三个分量；缺失或无法解析的分量及其后续分量取 0。
    pub fn parse_vector(raw: &str) -> Vec3 {
        let mut components = [0.0f32; 3];
        for (slot, token) in components.iter_mut().zip(raw.split_whitespace()) {
            match token.parse::<f32>() {
                Ok(value) => *slot = value,
                Err(_) => break,
            }
        }
        Vec3::from_array(components)
    }
}

pub mod fingerprint {
    /// 几何指纹的固定种子。
    pub const GEOMETRY_CRC_SEED: u32 = 0x811c_9dc5;
    const FOLD_PRIME: u32 = 0x0100_0193;

    /// 32 位滚动校验，仅用于变更检测，不具备抗碰撞能力。
    ///
    /// 浮点数按位模式折叠，因此同一数值每次得到相同结果。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeometryHasher {
        state: u32,
    }

    impl Default for GeometryHasher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl GeometryHasher {
        #[inline]
        pub fn new() -> Self {
            Self {
                state: GEOMETRY_CRC_SEED,
            }
        }

        pub fn write_u32(&mut self, value: u32) {
            for byte in value.to_le_bytes() {
                self.state ^= u32::from(byte);
                self.state = self.state.wrapping_mul(FOLD_PRIME);
            }
        }

        #[inline]
        pub fn write_f32(&mut self, value: f32) {
            self.write_u32(value.to_bits());
        }

        #[inline]
        pub fn finish(&self) -> u32 {
            self.state
        }
    }
}

pub mod primitive {
    use glam::{Vec2, Vec3, Vec4};
    use serde::{Deserialize, Serialize};

    use crate::fingerprint::GeometryHasher;
    use crate::geometry::{Plane, texture_vectors};
    use crate::properties::PropertySet;

    /// 未显式指定细分时的默认曲面细分数。
    pub const DEFAULT_CURVE_SUBDIVISION: u32 = 4;

    /// 笔刷的一个面。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BrushSide {
        pub material: String,
        pub plane: Plane,
        pub texture_matrix: [Vec3; 2],
        /// 解析时所在实体的原点，纹理矩阵相对于该点。
        pub origin: Vec3,
    }

    impl Default for BrushSide {
        fn default() -> Self {
            Self {
                material: String::new(),
                plane: Plane::ZERO,
                texture_matrix: [Vec3::ZERO; 2],
                origin: Vec3::ZERO,
            }
        }
    }

    impl BrushSide {
        pub fn new(plane: Plane, material: impl Into<String>, texture_matrix: [Vec3; 2]) -> Self {
            Self {
                material: material.into(),
                plane,
                texture_matrix,
                origin: Vec3::ZERO,
            }
        }

        /// 世界空间的 S/T 纹理轴。
        pub fn texture_vectors(&self) -> [Vec4; 2] {
            texture_vectors(self.plane.normal, &self.texture_matrix, self.origin)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct MapBrush {
        sides: Vec<BrushSide>,
        pub properties: PropertySet,
    }

    impl MapBrush {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_sides(sides: Vec<BrushSide>) -> Self {
            Self {
                sides,
                properties: PropertySet::new(),
            }
        }

        #[inline]
        pub fn num_sides(&self) -> usize {
            self.sides.len()
        }

        /// 追加一个面，返回其索引。
        pub fn add_side(&mut self, side: BrushSide) -> usize {
            self.sides.push(side);
            self.sides.len() - 1
        }

        #[inline]
        pub fn side(&self, index: usize) -> Option<&BrushSide> {
            self.sides.get(index)
        }

        #[inline]
        pub fn side_mut(&mut self, index: usize) -> Option<&mut BrushSide> {
            self.sides.get_mut(index)
        }

        #[inline]
        pub fn sides(&self) -> &[BrushSide] {
            &self.sides
        }

        pub fn sides_mut(&mut self) -> impl Iterator<Item = &mut BrushSide> + '_ {
            self.sides.iter_mut()
        }

        pub fn hash_geometry(&self, hasher: &mut GeometryHasher) {
            for side in &self.sides {
                for coefficient in side.plane.coefficients() {
                    hasher.write_f32(coefficient);
                }
            }
        }
    }

    /// 曲面控制点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct PatchVertex {
        pub xyz: Vec3,
        pub st: Vec2,
        pub color: [u8; 4],
    }

    impl PatchVertex {
        pub const WHITE: [u8; 4] = [255, 255, 255, 255];

        #[inline]
        pub fn new(xyz: Vec3, st: Vec2) -> Self {
            Self {
                xyz,
                st,
                color: Self::WHITE,
            }
        }
    }

    impl Default for PatchVertex {
        fn default() -> Self {
            Self::new(Vec3::ZERO, Vec2::ZERO)
        }
    }

    /// 曲面控制网格，按行主序保存（索引为 `row * width + column`）。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct PatchSurface {
        width: usize,
        height: usize,
        verts: Vec<PatchVertex>,
    }

    impl PatchSurface {
        /// 0×0 的空网格。
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_size(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                verts: vec![PatchVertex::default(); width * height],
            }
        }

        /// 顶点数量与 `width * height` 不一致时返回 `None`。
        pub fn from_vertices(width: usize, height: usize, verts: Vec<PatchVertex>) -> Option<Self> {
            if verts.len() != width * height {
                return None;
            }
            Some(Self {
                width,
                height,
                verts,
            })
        }

        #[inline]
        pub fn width(&self) -> usize {
            self.width
        }

        #[inline]
        pub fn height(&self) -> usize {
            self.height
        }

        #[inline]
        pub fn vertices(&self) -> &[PatchVertex] {
            &self.verts
        }

        pub fn vertex(&self, row: usize, column: usize) -> Option<&PatchVertex> {
            if row >= self.height || column >= self.width {
                return None;
            }
            self.verts.get(row * self.width + column)
        }

        pub fn vertex_mut(&mut self, row: usize, column: usize) -> Option<&mut PatchVertex> {
            if row >= self.height || column >= self.width {
                return None;
            }
            self.verts.get_mut(row * self.width + column)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MapPatch {
        pub surface: PatchSurface,
        pub material: String,
        pub horz_subdivisions: u32,
        pub vert_subdivisions: u32,
        pub explicit_subdivisions: bool,
        pub properties: PropertySet,
    }

    impl Default for MapPatch {
        fn default() -> Self {
            Self {
                surface: PatchSurface::new(),
                material: String::new(),
                horz_subdivisions: DEFAULT_CURVE_SUBDIVISION,
                vert_subdivisions: DEFAULT_CURVE_SUBDIVISION,
                explicit_subdivisions: false,
                properties: PropertySet::new(),
            }
        }
    }

    impl MapPatch {
        pub fn new(surface: PatchSurface, material: impl Into<String>) -> Self {
            Self {
                surface,
                material: material.into(),
                ..Self::default()
            }
        }

        /// 设置显式细分数，写出时会使用 `patchDef3`。
        pub fn set_subdivisions(&mut self, horizontal: u32, vertical: u32) {
            self.horz_subdivisions = horizontal;
            self.vert_subdivisions = vertical;
            self.explicit_subdivisions = true;
        }

        pub fn hash_geometry(&self, hasher: &mut GeometryHasher) {
            hasher.write_u32(self.surface.width() as u32);
            hasher.write_u32(self.surface.height() as u32);
            for vertex in self.surface.vertices() {
                hasher.write_f32(vertex.xyz.x);
                hasher.write_f32(vertex.xyz.y);
                hasher.write_f32(vertex.xyz.z);
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PrimitiveKind {
        Brush,
        Patch,
    }

    /// 实体中的一个几何图元。类型在构造后不可改变。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Primitive {
        Brush(MapBrush),
        Patch(MapPatch),
    }

    impl Primitive {
        #[inline]
        pub fn kind(&self) -> PrimitiveKind {
            match self {
                Primitive::Brush(_) => PrimitiveKind::Brush,
                Primitive::Patch(_) => PrimitiveKind::Patch,
            }
        }

        pub fn properties(&self) -> &PropertySet {
            match self {
                Primitive::Brush(brush) => &brush.properties,
                Primitive::Patch(patch) => &patch.properties,
            }
        }

        pub fn properties_mut(&mut self) -> &mut PropertySet {
            match self {
                Primitive::Brush(brush) => &mut brush.properties,
                Primitive::Patch(patch) => &mut patch.properties,
            }
        }

        pub fn as_brush(&self) -> Option<&MapBrush> {
            match self {
                Primitive::Brush(brush) => Some(brush),
                Primitive::Patch(_) => None,
            }
        }

        pub fn as_brush_mut(&mut self) -> Option<&mut MapBrush> {
            match self {
                Primitive::Brush(brush) => Some(brush),
                Primitive::Patch(_) => None,
            }
        }

        pub fn as_patch(&self) -> Option<&MapPatch> {
            match self {
                Primitive::Patch(patch) => Some(patch),
                Primitive::Brush(_) => None,
            }
        }

        pub fn as_patch_mut(&mut self) -> Option<&mut MapPatch> {
            match self {
                Primitive::Patch(patch) => Some(patch),
                Primitive::Brush(_) => None,
            }
        }

        /// 替换图元上的全部材质（笔刷的每个面或曲面本身）。
        pub fn set_material(&mut self, material: &str) {
            match self {
                Primitive::Brush(brush) => {
                    for side in brush.sides_mut() {
                        side.material = material.to_string();
                    }
                }
                Primitive::Patch(patch) => patch.material = material.to_string(),
            }
        }

        pub fn hash_geometry(&self, hasher: &mut GeometryHasher) {
            match self {
                Primitive::Brush(brush) => brush.hash_geometry(hasher),
                Primitive::Patch(patch) => patch.hash_geometry(hasher),
            }
        }
    }

    impl From<MapBrush> for Primitive {
        fn from(value: MapBrush) -> Self {
            Primitive::Brush(value)
        }
    }

    impl From<MapPatch> for Primitive {
        fn from(value: MapPatch) -> Self {
            Primitive::Patch(value)
        }
    }
}

pub mod entity {
    use glam::Vec3;
    use serde::{Deserialize, Serialize};

    use crate::fingerprint::GeometryHasher;
    use crate::primitive::Primitive;
    use crate::properties::PropertySet;

    pub const WORLDSPAWN_CLASSNAME: &str = "worldspawn";

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct MapEntity {
        pub properties: PropertySet,
        primitives: Vec<Primitive>,
    }

    impl MapEntity {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_classname(classname: impl Into<String>) -> Self {
            let mut entity = Self::new();
            entity.properties.set("classname", classname);
            entity
        }

        #[inline]
        pub fn classname(&self) -> Option<&str> {
            self.properties.get("classname")
        }

        #[inline]
        pub fn name(&self) -> Option<&str> {
            self.properties.get("name")
        }

        pub fn is_worldspawn(&self) -> bool {
            self.classname()
                .is_some_and(|classname| classname.eq_ignore_ascii_case(WORLDSPAWN_CLASSNAME))
        }

        /// `origin` 属性，缺失时为原点。
        pub fn origin(&self) -> Vec3 {
            self.properties.get_vector("origin").unwrap_or(Vec3::ZERO)
        }

        #[inline]
        pub fn num_primitives(&self) -> usize {
            self.primitives.len()
        }

        #[inline]
        pub fn primitive(&self, index: usize) -> Option<&Primitive> {
            self.primitives.get(index)
        }

        #[inline]
        pub fn primitive_mut(&mut self, index: usize) -> Option<&mut Primitive> {
            self.primitives.get_mut(index)
        }

        #[inline]
        pub fn primitives(&self) -> &[Primitive] {
            &self.primitives
        }

        pub fn primitives_mut(&mut self) -> impl Iterator<Item = &mut Primitive> + '_ {
            self.primitives.iter_mut()
        }

        pub fn add_primitive(&mut self, primitive: impl Into<Primitive>) -> usize {
            self.primitives.push(primitive.into());
            self.primitives.len() - 1
        }

        pub fn remove_primitive(&mut self, index: usize) -> Option<Primitive> {
            (index < self.primitives.len()).then(|| self.primitives.remove(index))
        }

        /// 取走全部图元，保留属性。
        pub fn take_primitives(&mut self) -> Vec<Primitive> {
            std::mem::take(&mut self.primitives)
        }

        pub fn append_primitives(&mut self, primitives: Vec<Primitive>) {
            self.primitives.extend(primitives);
        }

        /// 释放几何数据，仅保留键值对。此前计算的几何指纹随之失效。
        pub fn remove_primitive_data(&mut self) {
            self.primitives = Vec::new();
        }

        pub fn hash_geometry(&self, hasher: &mut GeometryHasher) {
            for primitive in &self.primitives {
                primitive.hash_geometry(hasher);
            }
        }

        pub fn geometry_crc(&self) -> u32 {
            let mut hasher = GeometryHasher::new();
            self.hash_geometry(&mut hasher);
            hasher.finish()
        }
    }
}

pub mod document {
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    use serde::{Deserialize, Serialize};

    use crate::entity::MapEntity;
    use crate::fingerprint::GeometryHasher;

    pub const OLD_MAP_VERSION: u32 = 1;
    pub const CURRENT_MAP_VERSION: u32 = 2;

    /// 磁盘格式版本。旧版本的材质名省略了 `textures/` 前缀。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum MapVersion {
        Old,
        #[default]
        Current,
    }

    impl MapVersion {
        pub fn from_number(number: f32) -> Self {
            if number < CURRENT_MAP_VERSION as f32 {
                MapVersion::Old
            } else {
                MapVersion::Current
            }
        }

        #[inline]
        pub fn number(self) -> u32 {
            match self {
                MapVersion::Old => OLD_MAP_VERSION,
                MapVersion::Current => CURRENT_MAP_VERSION,
            }
        }

        #[inline]
        pub fn has_implicit_texture_prefix(self) -> bool {
            matches!(self, MapVersion::Old)
        }
    }

    /// 世界实体上的加载指令执行结果，便于调用方记录日志。
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct WorldDirectives {
        pub removed_entities: usize,
        pub override_material: Option<String>,
        pub forced_names: usize,
        pub moved_groups: usize,
    }

    impl WorldDirectives {
        pub fn is_empty(&self) -> bool {
            *self == Self::default()
        }
    }

    /// 地图文档：有序实体列表及其来源信息。
    ///
    /// 几何指纹只在解析完成后计算一次，修改几何后需调用
    /// [`MapFile::refresh_geometry_crc`] 手动刷新。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MapFile {
        version: MapVersion,
        entities: Vec<MapEntity>,
        geometry_crc: u32,
        #[serde(skip)]
        file_time: Option<SystemTime>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_path: Option<PathBuf>,
        has_primitive_data: bool,
    }

    impl Default for MapFile {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MapFile {
        pub fn new() -> Self {
            Self {
                version: MapVersion::Current,
                entities: Vec::new(),
                geometry_crc: 0,
                file_time: None,
                name: String::new(),
                source_path: None,
                has_primitive_data: false,
            }
        }

        /// 由解析结果组装文档：计算指纹并标记几何数据驻留。
        pub fn from_parts(version: MapVersion, entities: Vec<MapEntity>) -> Self {
            let mut map = Self {
                version,
                entities,
                has_primitive_data: true,
                ..Self::new()
            };
            map.refresh_geometry_crc();
            map
        }

        /// 记录来源文件信息，由加载器在解析成功后调用。
        pub fn mark_loaded(
            &mut self,
            name: impl Into<String>,
            source_path: impl Into<PathBuf>,
            file_time: SystemTime,
        ) {
            self.name = name.into();
            self.source_path = Some(source_path.into());
            self.file_time = Some(file_time);
        }

        #[inline]
        pub fn version(&self) -> MapVersion {
            self.version
        }

        /// 不含扩展名的逻辑名称。
        #[inline]
        pub fn name(&self) -> &str {
            &self.name
        }

        #[inline]
        pub fn source_path(&self) -> Option<&Path> {
            self.source_path.as_deref()
        }

        #[inline]
        pub fn file_time(&self) -> Option<SystemTime> {
            self.file_time
        }

        #[inline]
        pub fn geometry_crc(&self) -> u32 {
            self.geometry_crc
        }

        /// 按文档顺序重新计算几何指纹，不修改已记录的值。
        pub fn compute_geometry_crc(&self) -> u32 {
            let mut hasher = GeometryHasher::new();
            for entity in &self.entities {
                entity.hash_geometry(&mut hasher);
            }
            hasher.finish()
        }

        pub fn refresh_geometry_crc(&mut self) -> u32 {
            self.geometry_crc = self.compute_geometry_crc();
            self.geometry_crc
        }

        #[inline]
        pub fn has_primitive_data(&self) -> bool {
            self.has_primitive_data
        }

        #[inline]
        pub fn num_entities(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn entity(&self, index: usize) -> Option<&MapEntity> {
            self.entities.get(index)
        }

        #[inline]
        pub fn entity_mut(&mut self, index: usize) -> Option<&mut MapEntity> {
            self.entities.get_mut(index)
        }

        pub fn entities(&self) -> impl Iterator<Item = &MapEntity> + '_ {
            self.entities.iter()
        }

        pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut MapEntity> + '_ {
            self.entities.iter_mut()
        }

        /// 世界实体：按约定为第一个实体。
        #[inline]
        pub fn world_entity(&self) -> Option<&MapEntity> {
            self.entities.first()
        }

        pub fn add_entity(&mut self, entity: MapEntity) -> usize {
            self.entities.push(entity);
            self.entities.len() - 1
        }

        /// 按 `name` 键查找实体。
        pub fn find_entity(&self, name: &str) -> Option<&MapEntity> {
            self.find_entity_index(name)
                .and_then(|index| self.entities.get(index))
        }

        pub fn find_entity_mut(&mut self, name: &str) -> Option<&mut MapEntity> {
            let index = self.find_entity_index(name)?;
            self.entities.get_mut(index)
        }

        pub fn find_entity_index(&self, name: &str) -> Option<usize> {
            self.entities
                .iter()
                .position(|entity| entity.name() == Some(name))
        }

        pub fn remove_entity(&mut self, index: usize) -> Option<MapEntity> {
            (index < self.entities.len()).then(|| self.entities.remove(index))
        }

        /// 移除所有 classname 匹配（不区分大小写）的实体，返回移除数量。
        pub fn remove_entities(&mut self, classname: &str) -> usize {
            let before = self.entities.len();
            self.entities
                .retain(|entity| !classname_matches(entity, classname));
            before - self.entities.len()
        }

        pub fn remove_all_entities(&mut self) {
            self.entities.clear();
        }

        pub fn remove_primitive_data(&mut self) {
            for entity in &mut self.entities {
                entity.remove_primitive_data();
            }
            self.has_primitive_data = false;
        }

        /// 执行世界实体上的加载指令：
        /// `removeEntities*`、`overrideMaterial`、`forceEntityNames`、`moveFuncGroups`。
        pub fn apply_world_directives(&mut self) -> WorldDirectives {
            let mut report = WorldDirectives::default();
            let Some(world) = self.entities.first() else {
                return report;
            };

            let remove_classnames: Vec<String> = world
                .properties
                .match_prefix("removeEntities")
                .map(|(_, value)| value.to_string())
                .collect();
            let override_material = world
                .properties
                .get("overrideMaterial")
                .filter(|material| !material.is_empty())
                .map(str::to_string);
            let force_names = world.properties.get_bool("forceEntityNames");
            let move_groups = world.properties.get_bool("moveFuncGroups");

            // 世界实体自身不参与移除。
            for classname in &remove_classnames {
                let before = self.entities.len();
                let mut index = 0;
                self.entities.retain(|entity| {
                    let keep = index == 0 || !classname_matches(entity, classname);
                    index += 1;
                    keep
                });
                report.removed_entities += before - self.entities.len();
            }

            if let Some(material) = override_material {
                for entity in &mut self.entities {
                    for primitive in entity.primitives_mut() {
                        primitive.set_material(&material);
                    }
                }
                report.override_material = Some(material);
            }

            if force_names {
                for (index, entity) in self.entities.iter_mut().enumerate().skip(1) {
                    if entity.name().is_none() {
                        let base = entity.classname().unwrap_or("forcedName");
                        let name = format!("{base}{index}");
                        entity.properties.set("name", name);
                        report.forced_names += 1;
                    }
                }
            }

            if move_groups {
                let mut moved = Vec::new();
                for entity in self.entities.iter_mut().skip(1) {
                    if classname_matches(entity, "func_group") {
                        moved.extend(entity.take_primitives());
                        report.moved_groups += 1;
                    }
                }
                if let Some(world) = self.entities.first_mut() {
                    world.append_primitives(moved);
                }
            }

            report
        }
    }

    fn classname_matches(entity: &MapEntity, classname: &str) -> bool {
        entity
            .classname()
            .is_some_and(|value| value.eq_ignore_ascii_case(classname))
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use crate::document::{MapFile, MapVersion};
    use crate::entity::MapEntity;
    use crate::fingerprint::{GEOMETRY_CRC_SEED, GeometryHasher};
    use crate::geometry::Plane;
    use crate::primitive::{
        BrushSide, MapBrush, MapPatch, PatchSurface, PatchVertex, Primitive, PrimitiveKind,
    };
    use crate::properties::{PropertySet, parse_vector};

    const TEX: [Vec3; 2] = [Vec3::new(0.0078125, 0.0, 0.0), Vec3::new(0.0, 0.0078125, 0.0)];

    fn cube_brush(size: f32) -> MapBrush {
        let normals = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        let sides = normals
            .into_iter()
            .map(|normal| BrushSide::new(Plane::new(normal, size), "textures/base/wall", TEX))
            .collect();
        MapBrush::with_sides(sides)
    }

    fn flat_patch() -> MapPatch {
        let verts = (0..9)
            .map(|i| {
                let (row, column) = (i / 3, i % 3);
                PatchVertex::new(
                    Vec3::new(column as f32 * 32.0, row as f32 * 32.0, 0.0),
                    Vec2::new(column as f32 * 0.5, row as f32 * 0.5),
                )
            })
            .collect();
        let surface = PatchSurface::from_vertices(3, 3, verts).expect("3x3 网格");
        MapPatch::new(surface, "textures/base/curve")
    }

    fn sample_map() -> MapFile {
        let mut world = MapEntity::with_classname("worldspawn");
        world.add_primitive(cube_brush(64.0));
        world.add_primitive(flat_patch());
        let mut light = MapEntity::with_classname("light");
        light.properties.set("name", "light_1");
        light.properties.set("origin", "0 0 128");
        MapFile::from_parts(MapVersion::Current, vec![world, light])
    }

    #[test]
    fn property_set_last_write_wins_and_is_case_sensitive() {
        let mut props = PropertySet::new();
        assert_eq!(props.set("classname", "light"), None);
        assert_eq!(props.set("Classname", "other"), None);
        assert_eq!(props.set("classname", "info_player_start").as_deref(), Some("light"));
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("classname"), Some("info_player_start"));
        assert_eq!(props.get("Classname"), Some("other"));
        assert_eq!(props.get("CLASSNAME"), None);
    }

    #[test]
    fn property_set_equality_ignores_order() {
        let mut a = PropertySet::new();
        a.set("a", "1");
        a.set("b", "2");
        let mut b = PropertySet::new();
        b.set("b", "2");
        b.set("a", "1");
        assert_eq!(a, b);
        b.set("a", "3");
        assert_ne!(a, b);
    }

    #[test]
    fn typed_property_accessors() {
        let mut props = PropertySet::new();
        props.set("origin", "1 -2.5");
        props.set("light", "300");
        props.set("scale", "0.25");
        props.set("flag", "1");
        props.set("removeEntities", "func_static");
        props.set("removeEntities2", "light");
        assert_eq!(props.get_vector("origin"), Some(Vec3::new(1.0, -2.5, 0.0)));
        assert_eq!(props.get_int("light"), Some(300));
        assert_eq!(props.get_float("scale"), Some(0.25));
        assert!(props.get_bool("flag"));
        assert!(!props.get_bool("missing"));
        let removed: Vec<_> = props.match_prefix("removeEntities").map(|(_, v)| v).collect();
        assert_eq!(removed, vec!["func_static", "light"]);
        assert_eq!(parse_vector("4 five 6"), Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn plane_from_points_is_normalized() {
        let plane = Plane::from_points(
            Vec3::new(0.0, 0.0, 16.0),
            Vec3::new(0.0, 64.0, 16.0),
            Vec3::new(64.0, 64.0, 16.0),
        )
        .expect("非共线点");
        assert!((plane.normal.length() - 1.0).abs() < 1e-6);
        assert!((plane.normal.z.abs() - 1.0).abs() < 1e-6);
        assert!(plane.distance_to(Vec3::new(10.0, 10.0, 16.0)).abs() < 1e-4);
        assert!(Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::X * 2.0).is_none());
    }

    #[test]
    fn plane_coefficients_round_trip_exactly() {
        let plane = Plane::from_coefficients([0.0, 0.0, 1.0, -64.0]);
        assert_eq!(plane.dist, 64.0);
        assert_eq!(plane.coefficients(), [0.0, 0.0, 1.0, -64.0]);
        assert!(Plane::ZERO.is_zero());
        assert!(Plane::new(Vec3::ZERO, 0.0).normalized().is_none());
    }

    #[test]
    fn fresh_side_and_patch_are_unset() {
        let side = BrushSide::default();
        assert!(side.plane.is_zero());
        let patch = MapPatch::default();
        assert_eq!(patch.surface.width(), 0);
        assert_eq!(patch.surface.height(), 0);
        assert!(patch.surface.vertices().is_empty());
        assert!(PatchSurface::from_vertices(2, 2, vec![PatchVertex::default(); 3]).is_none());
    }

    #[test]
    fn patch_surface_is_row_major() {
        let patch = flat_patch();
        let vertex = patch.surface.vertex(1, 2).expect("存在的控制点");
        assert_eq!(vertex.xyz, Vec3::new(64.0, 32.0, 0.0));
        assert!(patch.surface.vertex(3, 0).is_none());
    }

    #[test]
    fn texture_vectors_for_floor_face() {
        let side = BrushSide::new(Plane::new(Vec3::Z, 0.0), "floor", TEX);
        let [s, t] = side.texture_vectors();
        assert!((s.truncate().length() - 0.0078125).abs() < 1e-6);
        assert!((t.truncate().length() - 0.0078125).abs() < 1e-6);
        assert!(s.w.abs() < 1e-6);
    }

    #[test]
    fn empty_documents_share_the_seed_fingerprint() {
        let a = MapFile::from_parts(
            MapVersion::Current,
            vec![MapEntity::with_classname("worldspawn")],
        );
        let b = MapFile::from_parts(
            MapVersion::Old,
            vec![MapEntity::with_classname("worldspawn"), MapEntity::with_classname("light")],
        );
        assert_eq!(a.geometry_crc(), GEOMETRY_CRC_SEED);
        assert_eq!(a.geometry_crc(), b.geometry_crc());
        assert_eq!(GeometryHasher::new().finish(), GEOMETRY_CRC_SEED);
    }

    #[test]
    fn fingerprint_ignores_non_geometric_edits() {
        let mut map = sample_map();
        let original = map.geometry_crc();

        let world = map.entity_mut(0).expect("world");
        world.properties.set("message", "changed");
        if let Some(Primitive::Brush(brush)) = world.primitive_mut(0) {
            let side = brush.side_mut(0).expect("side");
            side.material = "textures/other".to_string();
            side.texture_matrix[0].x = 0.5;
            brush.properties.set("editor_note", "x");
        }
        if let Some(Primitive::Patch(patch)) = world.primitive_mut(1) {
            patch.material = "textures/other".to_string();
            patch.set_subdivisions(8, 8);
            if let Some(vertex) = patch.surface.vertex_mut(0, 0) {
                vertex.st = Vec2::new(3.0, 3.0);
                vertex.color = [0, 0, 0, 255];
            }
        }
        map.entity_mut(1).expect("light").properties.set("light", "500");

        assert_eq!(map.geometry_crc(), original);
        assert_eq!(map.refresh_geometry_crc(), original);
    }

    #[test]
    fn fingerprint_tracks_geometric_edits() {
        let mut map = sample_map();
        let original = map.geometry_crc();

        if let Some(Primitive::Brush(brush)) = map.entity_mut(0).and_then(|e| e.primitive_mut(0)) {
            brush.side_mut(2).expect("side").plane.dist = 65.0;
        }
        let after_plane = map.compute_geometry_crc();
        assert_ne!(after_plane, original);
        // 未调用刷新前，记录值保持不变。
        assert_eq!(map.geometry_crc(), original);

        if let Some(Primitive::Patch(patch)) = map.entity_mut(0).and_then(|e| e.primitive_mut(1)) {
            patch.surface.vertex_mut(2, 2).expect("vertex").xyz.z = 1.0;
        }
        assert_ne!(map.refresh_geometry_crc(), after_plane);
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let mut brush = cube_brush(64.0);
        let mut reordered = MapBrush::new();
        for side in brush.sides().iter().rev() {
            reordered.add_side(side.clone());
        }
        let mut a = GeometryHasher::new();
        brush.hash_geometry(&mut a);
        let mut b = GeometryHasher::new();
        reordered.hash_geometry(&mut b);
        assert_ne!(a.finish(), b.finish());

        brush.properties.set("k", "v");
        let mut c = GeometryHasher::new();
        brush.hash_geometry(&mut c);
        assert_eq!(a.finish(), c.finish());
    }

    #[test]
    fn remove_primitive_data_keeps_properties() {
        let mut map = sample_map();
        let properties_before = map.entity(0).expect("world").properties.clone();
        map.remove_primitive_data();
        assert!(!map.has_primitive_data());
        for entity in map.entities() {
            assert_eq!(entity.num_primitives(), 0);
        }
        assert_eq!(map.entity(0).expect("world").properties, properties_before);
    }

    #[test]
    fn entity_mutation_operations() {
        let mut map = sample_map();
        assert!(map.has_primitive_data());
        assert_eq!(map.find_entity("light_1").and_then(MapEntity::classname), Some("light"));
        assert!(map.find_entity("missing").is_none());

        let index = map.add_entity(MapEntity::with_classname("LIGHT"));
        assert_eq!(index, 2);
        assert_eq!(map.remove_entities("light"), 2);
        assert_eq!(map.num_entities(), 1);
        assert!(map.remove_entity(5).is_none());
        assert!(map.remove_entity(0).is_some());
        map.add_entity(MapEntity::new());
        map.remove_all_entities();
        assert_eq!(map.num_entities(), 0);
    }

    #[test]
    fn primitive_kind_is_fixed() {
        let brush: Primitive = cube_brush(8.0).into();
        let patch: Primitive = flat_patch().into();
        assert_eq!(brush.kind(), PrimitiveKind::Brush);
        assert_eq!(patch.kind(), PrimitiveKind::Patch);
        assert!(brush.as_patch().is_none());
        assert!(patch.as_brush().is_none());
    }

    #[test]
    fn world_directives_rewrite_the_document() {
        let mut world = MapEntity::with_classname("worldspawn");
        world.properties.set("removeEntities", "info_null");
        world.properties.set("overrideMaterial", "textures/common/caulk");
        world.properties.set("forceEntityNames", "1");
        world.properties.set("moveFuncGroups", "1");
        world.add_primitive(cube_brush(64.0));

        let mut group = MapEntity::with_classname("func_group");
        group.add_primitive(cube_brush(32.0));
        group.add_primitive(flat_patch());
        let null = MapEntity::with_classname("info_null");
        let mut named = MapEntity::with_classname("light");
        named.properties.set("name", "keep_me");

        let mut map = MapFile::from_parts(MapVersion::Current, vec![world, group, null, named]);
        let crc = map.geometry_crc();
        let report = map.apply_world_directives();

        assert_eq!(report.removed_entities, 1);
        assert_eq!(report.override_material.as_deref(), Some("textures/common/caulk"));
        assert_eq!(report.forced_names, 1);
        assert_eq!(report.moved_groups, 1);
        assert_eq!(map.num_entities(), 3);
        assert_eq!(map.entity(1).and_then(MapEntity::name), Some("func_group1"));
        assert_eq!(map.entity(2).and_then(MapEntity::name), Some("keep_me"));
        assert_eq!(map.entity(1).map(MapEntity::num_primitives), Some(0));

        let world = map.world_entity().expect("world");
        assert_eq!(world.num_primitives(), 3);
        let brush = world.primitive(0).and_then(Primitive::as_brush).expect("brush");
        assert!(brush.sides().iter().all(|side| side.material == "textures/common/caulk"));
        let patch = world.primitive(2).and_then(Primitive::as_patch).expect("patch");
        assert_eq!(patch.material, "textures/common/caulk");
        // 指令不会自动刷新指纹。
        assert_eq!(map.geometry_crc(), crc);
    }

    #[test]
    fn version_numbers() {
        assert_eq!(MapVersion::from_number(1.0), MapVersion::Old);
        assert_eq!(MapVersion::from_number(2.0), MapVersion::Current);
        assert_eq!(MapVersion::Current.number(), 2);
        assert!(MapVersion::Old.has_implicit_texture_prefix());
        assert_eq!(MapFile::new().version(), MapVersion::Current);
    }
}
