use glam::{Vec2, Vec3};
use mapfile_core::{
    document::{MapFile, MapVersion},
    entity::{MapEntity, WORLDSPAWN_CLASSNAME},
    geometry::Plane,
    primitive::{
        BrushSide, DEFAULT_CURVE_SUBDIVISION, MapBrush, MapPatch, PatchSurface, PatchVertex,
        Primitive,
    },
    properties::{PropertySet, parse_vector},
};
use tracing::{debug, warn};

use crate::MapError;
use crate::lexer::{LexError, Lexer, Token, TokenKind};

/// 旧格式与 Quake 3 格式中省略的材质目录前缀。
const IMPLICIT_TEXTURE_PREFIX: &str = "textures/";
/// Quake 3 的平移/缩放以纹素为单位，按 32 纹素的名义尺寸折算为纹理矩阵。
const Q3_NOMINAL_TEXTURE_SIZE: f32 = 32.0;
/// 显式平面法线与单位长度的容差。
const PLANE_NORMAL_EPSILON: f32 = 1e-5;
/// 按头部声明的尺寸预分配的上限，其余随读取增长。
const PATCH_PREALLOC_LIMIT: usize = 64;

/// 笔刷面的平面语法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideGrammar {
    /// `brushDef3`/`brushDef2`：`( a b c d )` 平面方程。
    Plane,
    /// `brushDef`/`brush`：三个边界点。
    ThreePoint,
    /// 无关键字的 Quake 3 笔刷：三点 + 平移/旋转/缩放。
    Quake3,
}

/// 曲面头部语法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchGrammar {
    /// `( w h 0 0 0 )`，使用默认细分。
    Def2,
    /// `( w h hSub vSub 0 0 0 )`，显式细分。
    Def3,
}

impl PatchGrammar {
    fn header_len(self) -> usize {
        match self {
            PatchGrammar::Def2 => 5,
            PatchGrammar::Def3 => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyntaxKind {
    Primitive,
    Entity,
    Document,
}

#[derive(Debug)]
struct SyntaxError {
    kind: SyntaxKind,
    line: usize,
    message: String,
}

impl SyntaxError {
    fn new(kind: SyntaxKind, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            message: message.into(),
        }
    }
}

impl From<SyntaxError> for MapError {
    fn from(err: SyntaxError) -> Self {
        let SyntaxError {
            kind,
            line,
            message,
        } = err;
        match kind {
            SyntaxKind::Primitive => MapError::MalformedPrimitive { line, message },
            SyntaxKind::Entity => MapError::MalformedEntity { line, message },
            SyntaxKind::Document => MapError::MalformedDocument { line, message },
        }
    }
}

fn lex_error(kind: SyntaxKind) -> impl FnOnce(LexError) -> SyntaxError {
    move |err| SyntaxError::new(kind, err.line, err.message)
}

/// 解析完整的 `.map` 文本。任一实体失败即整体失败，不返回部分文档。
pub fn parse_map(source: &str) -> Result<MapFile, MapError> {
    MapParser::new(source).parse().map_err(MapError::from)
}

struct MapParser<'a> {
    lexer: Lexer<'a>,
    version: MapVersion,
}

impl<'a> MapParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            version: MapVersion::Old,
        }
    }

    fn parse(mut self) -> Result<MapFile, SyntaxError> {
        self.version = self.parse_version_header()?;
        let mut entities = Vec::new();
        while let Some(entity) = self.parse_entity(entities.is_empty())? {
            entities.push(entity);
        }
        debug!(
            version = self.version.number(),
            entities = entities.len(),
            "地图文本解析完成"
        );
        Ok(MapFile::from_parts(self.version, entities))
    }

    fn parse_version_header(&mut self) -> Result<MapVersion, SyntaxError> {
        let kind = SyntaxKind::Document;
        match self.lexer.next_token().map_err(lex_error(kind))? {
            Some(token) if token.is_word("Version") => {
                let value = self
                    .lexer
                    .next_on_line()
                    .map_err(lex_error(kind))?
                    .ok_or_else(|| SyntaxError::new(kind, token.line, "Version 缺少版本号"))?;
                let number = parse_f32(&value, kind, "版本号")?;
                Ok(MapVersion::from_number(number))
            }
            Some(token) => {
                self.lexer.put_back(token);
                Ok(MapVersion::Old)
            }
            None => Ok(MapVersion::Old),
        }
    }

    fn parse_entity(&mut self, world_spawn: bool) -> Result<Option<MapEntity>, SyntaxError> {
        let kind = SyntaxKind::Entity;
        let Some(open) = self.lexer.next_token().map_err(lex_error(kind))? else {
            return Ok(None);
        };
        if !open.is_punct('{') {
            return Err(SyntaxError::new(
                kind,
                open.line,
                format!("期望 '{{' 开始实体，实际为 {}", open.describe()),
            ));
        }

        let mut entity = MapEntity::new();
        let mut origin = Vec3::ZERO;
        let mut is_world = false;

        loop {
            let token = self.expect_token(kind, "实体缺少结束的 '}'")?;
            if token.is_punct('}') {
                break;
            }
            if token.is_punct('{') {
                let primitive_origin = if is_world { Vec3::ZERO } else { origin };
                let primitive = self.parse_primitive(primitive_origin)?;
                entity.add_primitive(primitive);
                continue;
            }
            if !token.is_text() {
                return Err(SyntaxError::new(
                    kind,
                    token.line,
                    format!("意外的 {}，期望键名或 '{{'", token.describe()),
                ));
            }

            let key = token.text.trim_end().to_string();
            let value = match self.lexer.next_on_line().map_err(lex_error(kind))? {
                Some(value) if value.is_text() => value.text.trim_end().to_string(),
                _ => {
                    return Err(SyntaxError::new(
                        kind,
                        token.line,
                        format!("键 \"{key}\" 缺少值"),
                    ));
                }
            };

            if key.eq_ignore_ascii_case("origin") {
                origin = parse_vector(&value);
            } else if key.eq_ignore_ascii_case("classname")
                && value.eq_ignore_ascii_case(WORLDSPAWN_CLASSNAME)
            {
                is_world = true;
            }
            entity.properties.set(key, value);
        }

        if world_spawn && entity.classname().is_none() {
            warn!(primitives = entity.num_primitives(), "首个实体缺少 classname");
        }
        Ok(Some(entity))
    }

    /// 解析一个图元，调用时外层的 '{' 已被读取。
    fn parse_primitive(&mut self, origin: Vec3) -> Result<Primitive, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let token = self.expect_token(kind, "图元块提前结束")?;
        let keyword = token.text.to_ascii_lowercase();
        match (token.kind, keyword.as_str()) {
            (TokenKind::Word, "brushdef3" | "brushdef2") => self
                .parse_brush(SideGrammar::Plane, origin)
                .map(Primitive::Brush),
            (TokenKind::Word, "brushdef" | "brush") => self
                .parse_brush(SideGrammar::ThreePoint, origin)
                .map(Primitive::Brush),
            (TokenKind::Word, "patchdef2") => self
                .parse_patch(PatchGrammar::Def2)
                .map(Primitive::Patch),
            (TokenKind::Word, "patchdef3") => self
                .parse_patch(PatchGrammar::Def3)
                .map(Primitive::Patch),
            (TokenKind::Punct, "(") => {
                self.lexer.put_back(token);
                self.parse_q3_brush(origin).map(Primitive::Brush)
            }
            _ => Err(SyntaxError::new(
                kind,
                token.line,
                format!("未知的图元类型 {}", token.describe()),
            )),
        }
    }

    fn parse_brush(&mut self, grammar: SideGrammar, origin: Vec3) -> Result<MapBrush, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        self.expect_punct('{', kind, "笔刷定义")?;
        let mut brush = MapBrush::new();

        loop {
            let token = self.expect_token(kind, "笔刷缺少结束的 '}'")?;
            if token.is_punct('}') {
                break;
            }
            // 面之间可能夹带编辑器使用的键值对
            if token.kind == TokenKind::Quoted {
                self.parse_pair_into(token, &mut brush.properties, kind)?;
                continue;
            }
            if !token.is_punct('(') {
                return Err(SyntaxError::new(
                    kind,
                    token.line,
                    format!("意外的 {}，期望 '(' 或键值对", token.describe()),
                ));
            }
            self.lexer.put_back(token);
            let side = self.parse_side(grammar, origin)?;
            brush.add_side(side);
        }

        self.expect_punct('}', kind, "笔刷图元")?;
        Ok(brush)
    }

    fn parse_q3_brush(&mut self, origin: Vec3) -> Result<MapBrush, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let mut brush = MapBrush::new();
        loop {
            let token = self.expect_token(kind, "Quake 3 笔刷缺少结束的 '}'")?;
            if token.is_punct('}') {
                break;
            }
            if !token.is_punct('(') {
                return Err(SyntaxError::new(
                    kind,
                    token.line,
                    format!("意外的 {}，期望 '(' 开始笔刷面", token.describe()),
                ));
            }
            self.lexer.put_back(token);
            let side = self.parse_side(SideGrammar::Quake3, origin)?;
            brush.add_side(side);
        }
        Ok(brush)
    }

    fn parse_side(&mut self, grammar: SideGrammar, origin: Vec3) -> Result<BrushSide, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let mut side = BrushSide::default();
        let line = self.lexer.line();

        side.plane = match grammar {
            SideGrammar::Plane => {
                let plane = Plane::from_coefficients(self.parse_1d::<4>(kind, "平面方程")?);
                // 已是单位法线的平面原样保留，保证写出后位模式不变
                if (plane.normal.length() - 1.0).abs() <= PLANE_NORMAL_EPSILON {
                    plane
                } else {
                    plane
                        .normalized()
                        .ok_or_else(|| SyntaxError::new(kind, line, "平面法线长度为零"))?
                }
            }
            SideGrammar::ThreePoint | SideGrammar::Quake3 => {
                let mut points = [Vec3::ZERO; 3];
                for point in &mut points {
                    *point = Vec3::from_array(self.parse_1d::<3>(kind, "平面点")?) - origin;
                }
                Plane::from_points(points[0], points[1], points[2])
                    .ok_or_else(|| SyntaxError::new(kind, line, "平面的三个点共线"))?
            }
        };

        match grammar {
            SideGrammar::Plane | SideGrammar::ThreePoint => {
                side.texture_matrix = self.parse_texture_matrix()?;
                side.material = self.parse_material(self.version.has_implicit_texture_prefix())?;
                // 旧的内容/表面标志，只读取不保存
                for _ in 0..3 {
                    self.expect_int(kind, "笔刷面标志")?;
                }
            }
            SideGrammar::Quake3 => {
                side.material = self.parse_material(true)?;
                let mut values = [0.0f32; 5];
                for value in &mut values {
                    *value = self.expect_f32(kind, "Quake 3 纹理参数")?;
                }
                let [shift_s, shift_t, rotate, scale_s, scale_t] = values;
                side.texture_matrix =
                    q3_texture_matrix([shift_s, shift_t], rotate, [scale_s, scale_t]);
                self.parse_q3_flags()?;
            }
        }

        side.origin = origin;
        Ok(side)
    }

    /// Quake 3 面末尾同一行上可选的三个整数（contents、flags、value）。
    fn parse_q3_flags(&mut self) -> Result<(), SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let Some(first) = self.lexer.next_on_line().map_err(lex_error(kind))? else {
            return Ok(());
        };
        if first.is_punct('(') || first.is_punct('}') {
            self.lexer.put_back(first);
            return Ok(());
        }
        parse_i32(&first, kind, "Quake 3 内容标志")?;
        for _ in 0..2 {
            let token = self
                .lexer
                .next_on_line()
                .map_err(lex_error(kind))?
                .ok_or_else(|| SyntaxError::new(kind, first.line, "Quake 3 标志需要三个整数"))?;
            parse_i32(&token, kind, "Quake 3 标志")?;
        }
        Ok(())
    }

    fn parse_texture_matrix(&mut self) -> Result<[Vec3; 2], SyntaxError> {
        let kind = SyntaxKind::Primitive;
        self.expect_punct('(', kind, "纹理矩阵")?;
        let first = Vec3::from_array(self.parse_1d::<3>(kind, "纹理矩阵行")?);
        let second = Vec3::from_array(self.parse_1d::<3>(kind, "纹理矩阵行")?);
        self.expect_punct(')', kind, "纹理矩阵")?;
        Ok([first, second])
    }

    fn parse_material(&mut self, implicit_prefix: bool) -> Result<String, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let token = self.expect_token(kind, "缺少材质名")?;
        if !token.is_text() {
            return Err(SyntaxError::new(
                kind,
                token.line,
                format!("期望材质名，实际为 {}", token.describe()),
            ));
        }
        if implicit_prefix {
            Ok(format!("{IMPLICIT_TEXTURE_PREFIX}{}", token.text))
        } else {
            Ok(token.text)
        }
    }

    fn parse_patch(&mut self, grammar: PatchGrammar) -> Result<MapPatch, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        self.expect_punct('{', kind, "曲面定义")?;
        let material = self.parse_material(self.version.has_implicit_texture_prefix())?;

        let header_line = self.lexer.line();
        let header = self.parse_1d_dyn(grammar.header_len(), kind, "曲面头部")?;
        let width = patch_dimension(header[0], header_line, "宽度")?;
        let height = patch_dimension(header[1], header_line, "高度")?;

        let mut patch = MapPatch {
            material,
            ..MapPatch::default()
        };
        match grammar {
            PatchGrammar::Def2 => {
                patch.horz_subdivisions = DEFAULT_CURVE_SUBDIVISION;
                patch.vert_subdivisions = DEFAULT_CURVE_SUBDIVISION;
                patch.explicit_subdivisions = false;
            }
            PatchGrammar::Def3 => {
                let horizontal = subdivision_count(header[2], header_line)?;
                let vertical = subdivision_count(header[3], header_line)?;
                patch.set_subdivisions(horizontal, vertical);
            }
        }

        // 文件中按列写出：共 width 列，每列 height 个控制点。
        // 先逐列读取并核对数量，再转置为行主序。
        let mut columns: Vec<Vec<PatchVertex>> = Vec::with_capacity(width.min(PATCH_PREALLOC_LIMIT));
        self.expect_punct('(', kind, "控制点矩阵")?;
        loop {
            let open = self.expect_token(kind, "控制点矩阵未结束")?;
            if open.is_punct(')') {
                break;
            }
            if !open.is_punct('(') {
                return Err(SyntaxError::new(
                    kind,
                    open.line,
                    format!("控制点列: 期望 '('，实际为 {}", open.describe()),
                ));
            }
            if columns.len() == width {
                return Err(SyntaxError::new(
                    kind,
                    open.line,
                    format!("控制点列数多于声明的宽度 {width}"),
                ));
            }
            columns.push(self.parse_patch_column(columns.len(), height)?);
        }
        if columns.len() != width {
            return Err(SyntaxError::new(
                kind,
                header_line,
                format!("控制点列数 {} 少于声明的宽度 {width}", columns.len()),
            ));
        }

        let mut verts = Vec::with_capacity(width * height);
        for row in 0..height {
            verts.extend(columns.iter().filter_map(|column| column.get(row).copied()));
        }
        patch.surface = PatchSurface::from_vertices(width, height, verts).ok_or_else(|| {
            SyntaxError::new(kind, header_line, "控制点数量与宽高不一致")
        })?;

        // 键值对可以出现在内层 '}' 之前或之后
        self.parse_patch_pairs(&mut patch.properties, "曲面定义缺少结束的 '}'")?;
        self.parse_patch_pairs(&mut patch.properties, "曲面图元缺少结束的 '}'")?;

        Ok(patch)
    }

    /// 读取一列控制点，调用时列的 '(' 已被读取。
    fn parse_patch_column(
        &mut self,
        index: usize,
        height: usize,
    ) -> Result<Vec<PatchVertex>, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let mut column = Vec::with_capacity(height.min(PATCH_PREALLOC_LIMIT));
        loop {
            let token = self.expect_token(kind, "控制点列未结束")?;
            if token.is_punct(')') {
                break;
            }
            if column.len() == height {
                return Err(SyntaxError::new(
                    kind,
                    token.line,
                    format!("第 {index} 列的控制点多于声明的高度 {height}"),
                ));
            }
            self.lexer.put_back(token);
            column.push(self.parse_patch_vertex()?);
        }
        if column.len() != height {
            return Err(SyntaxError::new(
                kind,
                self.lexer.line(),
                format!("第 {index} 列只有 {} 个控制点，声明的高度为 {height}", column.len()),
            ));
        }
        Ok(column)
    }

    /// 读取键值对直到 '}'。
    fn parse_patch_pairs(
        &mut self,
        properties: &mut PropertySet,
        eof_message: &str,
    ) -> Result<(), SyntaxError> {
        let kind = SyntaxKind::Primitive;
        loop {
            let token = self.expect_token(kind, eof_message)?;
            if token.is_punct('}') {
                return Ok(());
            }
            if token.kind != TokenKind::Quoted {
                return Err(SyntaxError::new(
                    kind,
                    token.line,
                    format!("意外的 {}，期望键值对或 '}}'", token.describe()),
                ));
            }
            self.parse_pair_into(token, properties, kind)?;
        }
    }

    /// `( x y z s t )` 或带颜色的 `( x y z s t r g b a )`。
    fn parse_patch_vertex(&mut self) -> Result<PatchVertex, SyntaxError> {
        let kind = SyntaxKind::Primitive;
        let open = self.expect_token(kind, "控制点提前结束")?;
        if !open.is_punct('(') {
            let message = if open.is_punct(')') {
                "控制点列少于声明的高度".to_string()
            } else {
                format!("期望 '(' 开始控制点，实际为 {}", open.describe())
            };
            return Err(SyntaxError::new(kind, open.line, message));
        }

        let mut values = Vec::with_capacity(9);
        loop {
            let token = self.expect_token(kind, "控制点未结束")?;
            if token.is_punct(')') {
                break;
            }
            values.push(parse_f32(&token, kind, "控制点坐标")?);
        }

        let mut vertex = match values.as_slice() {
            [x, y, z, s, t] | [x, y, z, s, t, _, _, _, _] => {
                PatchVertex::new(Vec3::new(*x, *y, *z), Vec2::new(*s, *t))
            }
            _ => {
                return Err(SyntaxError::new(
                    kind,
                    open.line,
                    format!("控制点需要 5 或 9 个数值，实际为 {}", values.len()),
                ));
            }
        };
        if let [_, _, _, _, _, r, g, b, a] = values.as_slice() {
            vertex.color = [
                color_channel(*r),
                color_channel(*g),
                color_channel(*b),
                color_channel(*a),
            ];
        }
        Ok(vertex)
    }

    fn parse_pair_into(
        &mut self,
        key: Token,
        properties: &mut PropertySet,
        kind: SyntaxKind,
    ) -> Result<(), SyntaxError> {
        match self.lexer.next_on_line().map_err(lex_error(kind))? {
            Some(value) if value.kind == TokenKind::Quoted => {
                properties.set(key.text.trim_end(), value.text.trim_end());
                Ok(())
            }
            _ => Err(SyntaxError::new(
                kind,
                key.line,
                format!("键 \"{}\" 缺少字符串值", key.text),
            )),
        }
    }

    fn parse_1d<const N: usize>(
        &mut self,
        kind: SyntaxKind,
        context: &str,
    ) -> Result<[f32; N], SyntaxError> {
        let values = self.parse_1d_dyn(N, kind, context)?;
        let mut out = [0.0f32; N];
        out.copy_from_slice(&values);
        Ok(out)
    }

    /// `( v1 ... vn )`，数量必须恰好为 `len`。
    fn parse_1d_dyn(
        &mut self,
        len: usize,
        kind: SyntaxKind,
        context: &str,
    ) -> Result<Vec<f32>, SyntaxError> {
        let open = self.expect_punct('(', kind, context)?;
        let mut values = Vec::with_capacity(len);
        loop {
            let token = self.expect_token(kind, "括号未闭合")?;
            if token.is_punct(')') {
                break;
            }
            values.push(parse_f32(&token, kind, context)?);
        }
        if values.len() != len {
            return Err(SyntaxError::new(
                kind,
                open.line,
                format!("{context} 需要 {len} 个数值，实际为 {}", values.len()),
            ));
        }
        Ok(values)
    }

    fn expect_token(&mut self, kind: SyntaxKind, eof_message: &str) -> Result<Token, SyntaxError> {
        let line = self.lexer.line();
        self.lexer
            .next_token()
            .map_err(lex_error(kind))?
            .ok_or_else(|| SyntaxError::new(kind, line, eof_message))
    }

    fn expect_punct(
        &mut self,
        ch: char,
        kind: SyntaxKind,
        context: &str,
    ) -> Result<Token, SyntaxError> {
        let token = self.expect_token(kind, &format!("{context} 提前结束，期望 '{ch}'"))?;
        if token.is_punct(ch) {
            Ok(token)
        } else {
            Err(SyntaxError::new(
                kind,
                token.line,
                format!("{context}: 期望 '{ch}'，实际为 {}", token.describe()),
            ))
        }
    }

    fn expect_f32(&mut self, kind: SyntaxKind, context: &str) -> Result<f32, SyntaxError> {
        let token = self.expect_token(kind, &format!("{context} 提前结束"))?;
        parse_f32(&token, kind, context)
    }

    fn expect_int(&mut self, kind: SyntaxKind, context: &str) -> Result<i32, SyntaxError> {
        let token = self.expect_token(kind, &format!("{context} 提前结束"))?;
        parse_i32(&token, kind, context)
    }
}

fn parse_f32(token: &Token, kind: SyntaxKind, context: &str) -> Result<f32, SyntaxError> {
    if token.kind != TokenKind::Word {
        return Err(SyntaxError::new(
            kind,
            token.line,
            format!("{context}: 期望数值，实际为 {}", token.describe()),
        ));
    }
    token.text.parse::<f32>().map_err(|_| {
        SyntaxError::new(
            kind,
            token.line,
            format!("{context} 解析失败（值：\"{}\"）", token.text),
        )
    })
}

fn parse_i32(token: &Token, kind: SyntaxKind, context: &str) -> Result<i32, SyntaxError> {
    if token.kind != TokenKind::Word {
        return Err(SyntaxError::new(
            kind,
            token.line,
            format!("{context}: 期望整数，实际为 {}", token.describe()),
        ));
    }
    token.text.parse::<i32>().map_err(|_| {
        SyntaxError::new(
            kind,
            token.line,
            format!("{context} 解析失败（值：\"{}\"）", token.text),
        )
    })
}

fn patch_dimension(value: f32, line: usize, context: &str) -> Result<usize, SyntaxError> {
    if value.fract() != 0.0 || value < 1.0 || value > u16::MAX as f32 {
        return Err(SyntaxError::new(
            SyntaxKind::Primitive,
            line,
            format!("曲面{context}无效（值：{value}）"),
        ));
    }
    Ok(value as usize)
}

fn subdivision_count(value: f32, line: usize) -> Result<u32, SyntaxError> {
    if value.fract() != 0.0 || value < 0.0 || value > u16::MAX as f32 {
        return Err(SyntaxError::new(
            SyntaxKind::Primitive,
            line,
            format!("曲面细分数无效（值：{value}）"),
        ));
    }
    Ok(value as u32)
}

fn color_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// 把 Quake 3 的平移/旋转/缩放折算为 2×3 纹理矩阵。
/// 缩放为零时按 1 处理；默认参数得到 `1/32` 的单位矩阵。
fn q3_texture_matrix(shift: [f32; 2], rotate: f32, scale: [f32; 2]) -> [Vec3; 2] {
    let scale_s = if scale[0] == 0.0 { 1.0 } else { scale[0] };
    let scale_t = if scale[1] == 0.0 { 1.0 } else { scale[1] };
    let (sin, cos) = rotate.to_radians().sin_cos();
    let size = Q3_NOMINAL_TEXTURE_SIZE;
    [
        Vec3::new(
            cos / (scale_s * size),
            sin / (scale_s * size),
            shift[0] / size,
        ),
        Vec3::new(
            -sin / (scale_t * size),
            cos / (scale_t * size),
            shift[1] / size,
        ),
    ]
}
