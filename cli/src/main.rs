use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lens_core::{parse_json, LensConfig, ValidationReport};
use lens_fhir::{ClinicalBundle, PersonaReader};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "lens-cli",
    about = "Trích xuất dữ kiện lâm sàng và đối chiếu với các mục ePI."
)]
struct Args {
    /// File JSON tuỳ chọn ghi đè cấu hình lens mặc định.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// In bệnh nhân, bệnh lý, dị ứng và thuốc của một bundle.
    Facts {
        /// Đường dẫn tới file JSON bundle lâm sàng.
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Liệt kê các mục ePI liên quan tới bundle lâm sàng.
    Sections {
        #[arg(long)]
        epi: PathBuf,
        #[arg(long)]
        ips: PathBuf,
        /// Chỉ so giá trị mã, bỏ qua hệ mã.
        #[arg(long)]
        loose: bool,
    },
    /// In các chiều persona của một persona vector.
    Dimensions {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Kiểm tra cấu trúc tài liệu đầu vào.
    Validate {
        #[arg(value_enum)]
        kind: DocumentKind,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Làm nổi bật các mục ePI liên quan tới bundle lâm sàng.
    Annotate {
        #[arg(long)]
        epi: PathBuf,
        #[arg(long)]
        ips: PathBuf,
        /// Class cần thêm; mặc định là class nổi bật trong cấu hình.
        #[arg(long, conflicts_with = "collapse")]
        class: Option<String>,
        #[arg(long)]
        lens_tag: Option<String>,
        /// Chỉ so giá trị mã, bỏ qua hệ mã.
        #[arg(long)]
        loose: bool,
        /// Đánh dấu thêm các mục không khớp bằng class thu gọn trong cấu hình.
        #[arg(long)]
        collapse: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DocumentKind {
    Epi,
    Ips,
    Persona,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lens_fhir=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => serde_json::from_value::<LensConfig>(read_json(path)?)
            .with_context(|| format!("Config không hợp lệ trong {path:?}"))?,
        None => LensConfig::default(),
    };

    match args.command {
        Command::Facts { input } => {
            let bundle = read_json(&input)?;
            let facts = ClinicalBundle::new(&bundle).facts();
            tracing::info!(
                conditions = facts.conditions.len(),
                allergies = facts.allergies.len(),
                medications = facts.medications.len(),
                "extracted clinical facts"
            );
            print_json(&facts)?;
        }
        Command::Sections { epi, ips, loose } => {
            let epi = read_json(&epi)?;
            let ips = read_json(&ips)?;
            let sections = lens_fhir::match_clinical_sections(&epi, &ips, !loose);
            tracing::info!(matched = sections.len(), "matched ePI sections");
            print_json(&sections)?;
        }
        Command::Dimensions { input } => {
            let persona = read_json(&input)?;
            let reader = PersonaReader::with_config(&persona, &config);
            print_json(&reader.dimensions())?;
        }
        Command::Validate { kind, input } => {
            let document = read_json(&input)?;
            let report = match kind {
                DocumentKind::Epi => lens_fhir::validate_epi(&document),
                DocumentKind::Ips => lens_fhir::validate_clinical_bundle(&document),
                DocumentKind::Persona => lens_fhir::validate_persona_vector(&document),
            };
            report_validation(&report);
            print_json(&report)?;
        }
        Command::Annotate {
            epi,
            ips,
            class,
            lens_tag,
            loose,
            collapse,
        } => {
            let epi = read_json(&epi)?;
            let ips = read_json(&ips)?;
            let sections = lens_fhir::match_clinical_sections(&epi, &ips, !loose);
            let annotated = if collapse {
                lens_fhir::annotate_relevance(&epi, &sections, &config, lens_tag.as_deref())?
            } else {
                let class = class.unwrap_or_else(|| config.highlight_class.clone());
                lens_fhir::annotate_document(&epi, &sections, &class, lens_tag.as_deref())?
            };
            print_json(&annotated)?;
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Không đọc được file {path:?}"))?;
    parse_json(&data).with_context(|| format!("Không phân tích được JSON trong {path:?}"))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_validation(report: &ValidationReport) {
    for error in &report.errors {
        tracing::warn!("{error}");
    }
}
