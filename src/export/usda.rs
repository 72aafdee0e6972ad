//! USD/USDZ export.
//!
//! Generates USDA (ASCII) format manually via string formatting. Meshes
//! live under `/Asset/Meshes`, preview materials under
//! `/Asset/Materials/UsdPreviewSurface/Materials` and node-graph materials
//! are pulled in from the MaterialX document by a reference on
//! `/Asset/Materials/MaterialX`.
//!
//! USDZ is a zero-compression ZIP archive with 64-byte alignment.

use crate::converter::{BoundSubmesh, ConversionOutput, ConvertedMesh};
use crate::error::{BridgeError, Result};
use crate::geometry::{Attribute, AttributeData, Provenance};
use crate::shading::{Input, InputSource, Node, PreviewMaterial};
use std::collections::HashSet;
use std::fmt::Write;
use std::io::Write as IoWrite;

const PREVIEW_MATERIALS: &str = "/Asset/Materials/UsdPreviewSurface/Materials";
const MTLX_MATERIALS: &str = "/Asset/Materials/MaterialX/Materials";

/// A file packed next to the root layer in a USDZ archive.
pub struct UsdzFile {
    /// Path within the archive (e.g., "textures/base.png").
    pub filename: String,
    pub data: Vec<u8>,
}

/// Export meshes and preview materials as USDA text. Node-graph materials
/// are referenced from `mtlx_file`.
pub fn export_usda(output: &ConversionOutput, mtlx_file: &str) -> Result<String> {
    if output.meshes.iter().all(|m| m.submeshes.is_empty()) && output.material_names.is_empty() {
        return Err(BridgeError::Export("Cannot export an empty conversion".to_string()));
    }

    let networks: HashSet<&str> = output.networks.iter().map(|n| n.material_name.as_str()).collect();
    let previews: HashSet<&str> = output.previews.iter().map(|p| p.name.as_str()).collect();

    // ~150 bytes per point across the arrays
    let point_count: usize = output
        .meshes
        .iter()
        .flat_map(|m| &m.submeshes)
        .map(|s| s.submesh.vertex_count())
        .sum();
    let mut usda = String::with_capacity(2048 + point_count * 150);

    let _ = writeln!(usda, "#usda 1.0");
    let _ = writeln!(usda, "(");
    let _ = writeln!(usda, "    defaultPrim = \"Asset\"");
    let _ = writeln!(usda, "    metersPerUnit = 1");
    let _ = writeln!(usda, "    upAxis = \"Y\"");
    let _ = writeln!(usda, ")\n");
    let _ = writeln!(usda, "def Xform \"Asset\"");
    let _ = writeln!(usda, "{{");

    let _ = writeln!(usda, "    def Scope \"Meshes\"");
    let _ = writeln!(usda, "    {{");
    for mesh in &output.meshes {
        write_mesh(&mut usda, mesh, &previews, &networks);
    }
    let _ = writeln!(usda, "    }}\n");

    let _ = writeln!(usda, "    def Scope \"Materials\"");
    let _ = writeln!(usda, "    {{");
    if !output.previews.is_empty() {
        let _ = writeln!(usda, "        def Scope \"UsdPreviewSurface\"");
        let _ = writeln!(usda, "        {{");
        let _ = writeln!(usda, "            def Scope \"Materials\"");
        let _ = writeln!(usda, "            {{");
        for preview in &output.previews {
            write_preview_material(&mut usda, preview);
        }
        let _ = writeln!(usda, "            }}");
        let _ = writeln!(usda, "        }}");
    }
    if !output.networks.is_empty() {
        let _ = writeln!(usda, "        over \"MaterialX\" (");
        let _ = writeln!(usda, "            references = @{}@</MaterialX>", mtlx_file);
        let _ = writeln!(usda, "        )");
        let _ = writeln!(usda, "        {{");
        let _ = writeln!(usda, "        }}");
    }
    let _ = writeln!(usda, "    }}");

    let _ = writeln!(usda, "}}");
    Ok(usda)
}

/// Export a USDZ archive holding the root layer, the MaterialX document
/// (when node-graph materials were built) and the given texture files.
pub fn export_usdz(output: &ConversionOutput, files: &[UsdzFile]) -> Result<Vec<u8>> {
    const MTLX_FILE: &str = "materials.mtlx";
    let usda = export_usda(output, MTLX_FILE)?;
    let mtlx = (!output.networks.is_empty()).then(|| super::mtlx::export_mtlx(&output.networks));

    let mut buf = Vec::new();
    {
        let cursor = std::io::Cursor::new(&mut buf);
        let mut zip = zip::ZipWriter::new(cursor);

        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .with_alignment(64);

        let mut entries: Vec<(&str, &[u8])> = vec![("root.usda", usda.as_bytes())];
        if let Some(mtlx) = &mtlx {
            entries.push((MTLX_FILE, mtlx.as_bytes()));
        }
        entries.extend(files.iter().map(|f| (f.filename.as_str(), f.data.as_slice())));

        for (name, data) in entries {
            zip.start_file(name, options)
                .map_err(|e| BridgeError::Export(format!("USDZ write error: {}", e)))?;
            zip.write_all(data)
                .map_err(|e| BridgeError::Export(format!("USDZ write error: {}", e)))?;
        }

        zip.finish()
            .map_err(|e| BridgeError::Export(format!("USDZ finalize error: {}", e)))?;
    }

    Ok(buf)
}

/// Write a comma-separated array inline, streaming values directly to the buffer.
fn write_array_inline<T, F>(usda: &mut String, items: &[T], mut fmt: F)
where
    F: FnMut(&T, &mut String),
{
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            usda.push_str(", ");
        }
        fmt(item, usda);
    }
}

fn write_attribute_values(usda: &mut String, data: &AttributeData) {
    usda.push('[');
    match data {
        AttributeData::Float(values) => write_array_inline(usda, values, |v, s| {
            let _ = write!(s, "{}", v);
        }),
        AttributeData::Vec2(values) => write_array_inline(usda, values, |v, s| {
            let _ = write!(s, "({}, {})", v[0], v[1]);
        }),
        AttributeData::Vec3(values) => write_array_inline(usda, values, |v, s| {
            let _ = write!(s, "({}, {}, {})", v[0], v[1], v[2]);
        }),
        AttributeData::Vec4(values) => write_array_inline(usda, values, |v, s| {
            let _ = write!(s, "({}, {}, {}, {})", v[0], v[1], v[2], v[3]);
        }),
    }
    usda.push(']');
}

/// USD array type for a primvar, from its name and element type.
fn primvar_type(attribute: &Attribute) -> &'static str {
    match &attribute.data {
        AttributeData::Float(_) => "float[]",
        AttributeData::Vec2(_) if attribute.name.starts_with("st") => "texCoord2f[]",
        AttributeData::Vec2(_) => "float2[]",
        AttributeData::Vec3(_) if attribute.name.starts_with("color") => "color3f[]",
        AttributeData::Vec3(_) => "float3[]",
        AttributeData::Vec4(_) => "float4[]",
    }
}

/// Write `<decl> = [...]` followed by the interpolation metadata block.
fn write_array_attribute(usda: &mut String, decl: &str, attribute: &Attribute) {
    let _ = write!(usda, "                {} = ", decl);
    write_attribute_values(usda, &attribute.data);
    let _ = writeln!(usda, " (");
    let _ = writeln!(usda, "                    interpolation = \"{}\"", attribute.interpolation.usd_token());
    if attribute.provenance == Provenance::Generated {
        let _ = writeln!(usda, "                    customData = {{ bool generated = 1 }}");
    }
    let _ = writeln!(usda, "                )");
}

fn write_mesh(usda: &mut String, mesh: &ConvertedMesh, previews: &HashSet<&str>, networks: &HashSet<&str>) {
    let _ = writeln!(usda, "        def Xform \"{}\"", mesh.name);
    let _ = writeln!(usda, "        {{");
    for bound in &mesh.submeshes {
        write_mesh_prim(usda, bound, previews, networks);
    }
    let _ = writeln!(usda, "        }}");
}

/// Write a Mesh prim with face arrays, primvars and material bindings.
fn write_mesh_prim(usda: &mut String, bound: &BoundSubmesh, previews: &HashSet<&str>, networks: &HashSet<&str>) {
    let submesh = &bound.submesh;
    let _ = writeln!(usda, "            def Mesh \"{}\" (", bound.name);
    let _ = writeln!(usda, "                prepend apiSchemas = [\"MaterialBindingAPI\"]");
    let _ = writeln!(usda, "            )");
    let _ = writeln!(usda, "            {{");

    if submesh.double_sided {
        let _ = writeln!(usda, "                uniform bool doubleSided = 1");
    }

    let _ = write!(usda, "                int[] faceVertexCounts = [");
    write_array_inline(usda, &submesh.face_vertex_counts, |c, s| {
        let _ = write!(s, "{}", c);
    });
    let _ = writeln!(usda, "]");

    let _ = write!(usda, "                int[] faceVertexIndices = [");
    write_array_inline(usda, &submesh.face_vertex_indices, |i, s| {
        let _ = write!(s, "{}", i);
    });
    let _ = writeln!(usda, "]");

    let _ = write!(usda, "                point3f[] points = ");
    write_attribute_values(usda, &submesh.points.data);
    let _ = writeln!(usda);

    if let Some(normals) = &submesh.normals {
        write_array_attribute(usda, "normal3f[] normals", normals);
    }
    for primvar in &submesh.primvars {
        let decl = format!("{} primvars:{}", primvar_type(primvar), primvar.name);
        write_array_attribute(usda, &decl, primvar);
    }

    if let Some(material) = bound.material.as_deref() {
        let has_preview = previews.contains(material);
        if networks.contains(material) {
            let _ = writeln!(usda, "                rel material:binding = <{}/{}>", MTLX_MATERIALS, material);
            if has_preview {
                let _ = writeln!(
                    usda,
                    "                rel material:binding:preview = <{}/{}>",
                    PREVIEW_MATERIALS, material
                );
            }
        } else if has_preview {
            let _ = writeln!(usda, "                rel material:binding = <{}/{}>", PREVIEW_MATERIALS, material);
        }
    }

    let _ = writeln!(usda, "            }}");
}

fn write_shader_input(usda: &mut String, material_path: &str, input: &Input) {
    let ty = input.ty.usd_name();
    match &input.source {
        InputSource::Value(value) => {
            let _ = writeln!(usda, "                        {} inputs:{} = {}", ty, input.name, value.to_usda_string());
        }
        InputSource::Node { node, output } => {
            let _ = writeln!(
                usda,
                "                        {} inputs:{}.connect = <{}/{}.outputs:{}>",
                ty,
                input.name,
                material_path,
                node,
                output.as_deref().unwrap_or("result")
            );
        }
        InputSource::GraphOutput { graph, output } => {
            let _ = writeln!(
                usda,
                "                        {} inputs:{}.connect = <{}/{}.outputs:{}>",
                ty, input.name, material_path, graph, output
            );
        }
    }
}

fn write_shader(usda: &mut String, material_path: &str, node: &Node) {
    let _ = writeln!(usda, "                    def Shader \"{}\"", node.name);
    let _ = writeln!(usda, "                    {{");
    let _ = writeln!(usda, "                        uniform token info:id = \"{}\"", node.kind.category());
    for input in &node.inputs {
        write_shader_input(usda, material_path, input);
    }
    for output in &node.outputs {
        let _ = writeln!(usda, "                        {} outputs:{}", output.ty.usd_name(), output.name);
    }
    let _ = writeln!(usda, "                    }}");
}

/// Write a UsdPreviewSurface material definition.
fn write_preview_material(usda: &mut String, material: &PreviewMaterial) {
    let path = format!("{}/{}", PREVIEW_MATERIALS, material.name);
    let _ = writeln!(usda, "                def Material \"{}\"", material.name);
    let _ = writeln!(usda, "                {{");
    let _ = writeln!(
        usda,
        "                    token outputs:surface.connect = <{}/{}.outputs:surface>",
        path, material.surface.name
    );
    write_shader(usda, &path, &material.surface);
    for node in &material.nodes {
        write_shader(usda, &path, node);
    }
    let _ = writeln!(usda, "                }}");
}
