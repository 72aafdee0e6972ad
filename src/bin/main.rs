//! glTF to USD bridge CLI
//!
//! Convert glTF assets into USD layers with MaterialX materials.

use clap::{Parser, Subcommand, ValueEnum};
use gltf_usd_bridge::{
    export_mtlx, export_usda, export_usdz, probe_image, CompatMode, ConvertOptions, Converter, GltfDocument,
    GraphLayout, ImageHandle, ImageMetadataMap, TangentTrigger, UsdzFile,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gltf-usd-bridge")]
#[command(author, version, about = "Convert glTF assets to USD with MaterialX materials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a .gltf or .glb file
    Convert {
        /// Input glTF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (without extension)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "usda")]
        format: OutputFormat,

        /// JSON file with conversion options; flags below override it
        #[arg(long)]
        options: Option<PathBuf>,

        /// Work around Storm's MaterialX limitations
        #[arg(long)]
        compat: bool,

        /// Place helper nodes next to the shader instead of in a node graph
        #[arg(long)]
        flatten: bool,

        /// Skip MaterialX materials
        #[arg(long)]
        no_mtlx: bool,

        /// Skip UsdPreviewSurface materials
        #[arg(long)]
        no_preview: bool,

        /// Generate tangents even when no MaterialX materials are emitted
        #[arg(long)]
        always_tangents: bool,
    },

    /// Show the meshes, materials and images of a glTF file
    Info {
        /// Input glTF file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// USDA layer plus a MaterialX document and image files
    Usda,
    /// Single USDZ archive
    Usdz,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            format,
            options,
            compat,
            flatten,
            no_mtlx,
            no_preview,
            always_tangents,
        } => {
            let mut config = match options {
                Some(path) => ConvertOptions::from_json(&fs::read_to_string(path)?)?,
                None => ConvertOptions::default(),
            };
            if compat {
                config = config.with_compat_mode(CompatMode::On);
            }
            if flatten {
                config = config.with_graph_layout(GraphLayout::Flattened);
            }
            if no_mtlx {
                config = config.with_node_graph(false);
            }
            if no_preview {
                config = config.with_preview_surface(false);
            }
            if always_tangents {
                config = config.with_tangent_trigger(TangentTrigger::Always);
            }
            convert(&input, &output, format, config)?;
        }
        Commands::Info { input } => {
            show_info(&input)?;
        }
    }

    Ok(())
}

fn load_document(path: &Path) -> Result<GltfDocument, Box<dyn std::error::Error>> {
    println!("Loading {:?}...", path);
    let dir = path.parent().unwrap_or(Path::new("."));
    let data = fs::read(path)?;
    let doc = GltfDocument::load(&data, |uri| Ok(fs::read(dir.join(uri))?))?;
    Ok(doc)
}

/// Image metadata for every image, plus the files that must be written
/// next to the output for embedded images.
fn collect_images(doc: &GltfDocument, dir: &Path) -> (ImageMetadataMap, Vec<UsdzFile>) {
    let mut images = doc.embedded_image_metadata();
    let mut files = Vec::new();
    for index in 0..doc.image_count() {
        let handle = ImageHandle(index);
        if let Some(metadata) = images.get(&handle) {
            if let Ok(Some(data)) = doc.image_data(handle) {
                files.push(UsdzFile {
                    filename: metadata.ref_path.clone(),
                    data: data.to_vec(),
                });
            }
            continue;
        }
        let Some(uri) = doc.image_uri(handle) else {
            continue;
        };
        match fs::read(dir.join(uri)) {
            Ok(data) => match probe_image(&data, uri) {
                Ok(metadata) => {
                    images.insert(handle, metadata);
                    files.push(UsdzFile {
                        filename: uri.to_string(),
                        data,
                    });
                }
                Err(e) => log::warn!("image {}: {}", uri, e),
            },
            Err(e) => log::warn!("image {}: {}", uri, e),
        }
    }
    (images, files)
}

fn convert(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    options: ConvertOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load_document(input)?;
    let dir = input.parent().unwrap_or(Path::new("."));
    let (images, files) = collect_images(&doc, dir);
    println!("  Found {} meshes, {} images", doc.mesh_count(), images.len());

    let (asset, import_diagnostics) = doc.to_asset();
    let mut result = Converter::new(options, &images).convert(&asset);
    result.report.diagnostics.splice(0..0, import_diagnostics);

    println!(
        "  Converted {} meshes, {} materials",
        result.meshes.len(),
        result.material_names.len()
    );
    for diagnostic in &result.report.diagnostics {
        println!("  [{:?}] {}: {}", diagnostic.kind, diagnostic.subject, diagnostic.message);
    }

    match format {
        OutputFormat::Usda => {
            let usda_path = if output.extension().is_some() {
                output.to_path_buf()
            } else {
                output.with_extension("usda")
            };
            let mtlx_path = usda_path.with_extension("mtlx");
            let mtlx_name = mtlx_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("materials.mtlx")
                .to_string();

            fs::write(&usda_path, export_usda(&result, &mtlx_name)?)?;
            println!("Exported USDA to {:?}", usda_path);
            if !result.networks.is_empty() {
                fs::write(&mtlx_path, export_mtlx(&result.networks))?;
                println!("  MaterialX: {:?}", mtlx_path);
            }

            let out_dir = usda_path.parent().unwrap_or(Path::new("."));
            for file in &files {
                let path = out_dir.join(&file.filename);
                if path.exists() {
                    continue;
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, &file.data)?;
                println!("  Image: {:?}", path);
            }
        }
        OutputFormat::Usdz => {
            let usdz_path = if output.extension().is_some() {
                output.to_path_buf()
            } else {
                output.with_extension("usdz")
            };
            let usdz = export_usdz(&result, &files)?;
            fs::write(&usdz_path, &usdz)?;
            println!("Exported USDZ ({} bytes) to {:?}", usdz.len(), usdz_path);
        }
    }

    Ok(())
}

fn show_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load_document(input)?;

    println!("\nglTF Info:");
    println!("  Meshes: {}", doc.mesh_count());
    for mesh in 0..doc.mesh_count() {
        println!(
            "    {} ({} primitives)",
            doc.mesh_name(mesh).unwrap_or("<unnamed>"),
            doc.primitive_count(mesh)
        );
    }
    let materials = doc.materials()?;
    println!("  Materials: {}", materials.len());
    for material in &materials {
        println!(
            "    {}{}",
            material.name.as_deref().unwrap_or("<unnamed>"),
            if material.unlit { " (unlit)" } else { "" }
        );
    }
    println!("  Images: {}", doc.image_count());

    Ok(())
}
