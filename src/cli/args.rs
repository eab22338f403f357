// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use yolo_decode::{DecodeStyle, ExpMode, InferenceConfig, ModelDescriptor, SizePolicy, TensorOrder};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r"Examples:
    yolo-decode decode --image frame.jpg --output head.bin --shape 1,84,8400 --labels coco.txt
    yolo-decode decode -i frame.jpg -o head.bin --shape 2100,66 -l labels.txt --style dfl --imgsz 320
    yolo-decode geometry --width 1280 --height 720 --imgsz 640 --align 32
    yolo-decode predict --model model.onnx --source images/ --labels coco.txt --conf 0.4")]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,

    /// Show verbose output
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a recorded output tensor for an image
    Decode(DecodeArgs),
    /// Print the letterbox geometry for an image size
    Geometry(GeometryArgs),
    /// Run an ONNX model on an image or a directory of images
    #[cfg(feature = "onnx")]
    Predict(PredictArgs),
}

/// Pipeline options shared by `decode` and `predict`.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Output head layout (direct, dfl, dfl:<bins>)
    #[arg(long)]
    pub style: Option<DecodeStyle>,

    /// Confidence threshold [default: 0.25 direct, 0.4 dfl]
    #[arg(long)]
    pub conf: Option<f32>,

    /// `IoU` threshold for NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Network input size (long side)
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// Round the network size up to this multiple instead of padding to a square
    #[arg(long)]
    pub align: Option<u32>,

    /// Anchor strides, finest first
    #[arg(long, value_delimiter = ',')]
    pub strides: Option<Vec<u32>>,

    /// Maximum number of detections per image
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// Suppress overlapping boxes across classes
    #[arg(long, default_value_t = false)]
    pub agnostic: bool,

    /// Use the fast exponential approximation
    #[arg(long, default_value_t = false)]
    pub fast_exp: bool,

    /// Feed the network BGR planes instead of RGB
    #[arg(long, default_value_t = false)]
    pub bgr: bool,

    /// Model descriptor (YAML) with style, strides, imgsz and names
    #[arg(long)]
    pub descriptor: Option<PathBuf>,
}

impl PipelineArgs {
    /// Build the configuration: descriptor layout first, then explicit flags.
    #[must_use]
    pub fn to_config(&self, descriptor: Option<&ModelDescriptor>) -> InferenceConfig {
        let mut config = InferenceConfig::new();
        if let Some(descriptor) = descriptor {
            config = descriptor.apply_to(config);
        }
        if let Some(style) = self.style {
            config = config.with_style(style);
        }
        if let Some(strides) = &self.strides {
            config = config.with_strides(strides.clone());
        }
        if let Some(size) = self.imgsz {
            config = config.with_size_policy(self.align.map_or(
                SizePolicy::Fixed { size },
                |stride| SizePolicy::StrideAligned { size, stride },
            ));
        }

        let conf = self
            .conf
            .unwrap_or_else(|| config.style.default_threshold());
        config
            .with_confidence(conf)
            .with_iou(self.iou)
            .with_max_detections(self.max_det)
            .with_agnostic_nms(self.agnostic)
            .with_exp_mode(if self.fast_exp {
                ExpMode::Fast
            } else {
                ExpMode::Exact
            })
            .with_tensor_order(if self.bgr {
                TensorOrder::Bgr
            } else {
                TensorOrder::Rgb
            })
    }
}

/// Arguments for the decode command.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Image the tensor was produced for
    #[arg(short, long)]
    pub image: PathBuf,

    /// Raw little-endian f32 output tensor
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output tensor shape, e.g. 1,84,8400
    #[arg(long, value_delimiter = ',', required = true)]
    pub shape: Vec<usize>,

    /// Label file, one class per line
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Arguments for the geometry command.
#[derive(Args, Debug)]
pub struct GeometryArgs {
    /// Original image width
    #[arg(long)]
    pub width: u32,

    /// Original image height
    #[arg(long)]
    pub height: u32,

    /// Network input size (long side)
    #[arg(long, default_value_t = 640)]
    pub imgsz: u32,

    /// Round the network size up to this multiple instead of padding to a square
    #[arg(long)]
    pub align: Option<u32>,
}

impl GeometryArgs {
    /// Letterbox policy selected by the flags.
    #[must_use]
    pub fn size_policy(&self) -> SizePolicy {
        self.align.map_or(
            SizePolicy::Fixed { size: self.imgsz },
            |stride| SizePolicy::StrideAligned {
                size: self.imgsz,
                stride,
            },
        )
    }
}

/// Arguments for the predict command.
#[cfg(feature = "onnx")]
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to ONNX model file
    #[arg(short, long)]
    pub model: PathBuf,

    /// Image file or directory of images
    #[arg(short, long)]
    pub source: PathBuf,

    /// Label file, one class per line [default: names from the model]
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// Intra-op threads for ONNX Runtime (0 = automatic)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_decode_args_defaults() {
        let args = Cli::parse_from([
            "app", "decode", "--image", "a.jpg", "--output", "a.bin", "--shape", "1,84,8400",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Decode(decode) => {
                assert_eq!(decode.shape, vec![1, 84, 8400]);
                assert!(decode.labels.is_none());
                let config = decode.pipeline.to_config(None);
                assert_eq!(config.style, DecodeStyle::Direct);
                assert!((config.prob_threshold - 0.25).abs() < f32::EPSILON);
                assert!((config.nms_threshold - 0.45).abs() < f32::EPSILON);
                assert_eq!(config.size_policy, SizePolicy::Fixed { size: 640 });
            }
            _ => panic!("expected decode"),
        }
    }

    #[test]
    fn test_decode_args_custom() {
        let args = Cli::parse_from([
            "app", "decode", "-i", "a.jpg", "-o", "a.bin", "--shape", "2100,66", "--style",
            "dfl", "--imgsz", "320", "--align", "32", "--strides", "8,16", "--fast-exp",
            "--verbose", "false",
        ]);
        assert!(!args.verbose);
        match args.command {
            Commands::Decode(decode) => {
                let config = decode.pipeline.to_config(None);
                assert_eq!(config.style, DecodeStyle::dfl());
                assert!((config.prob_threshold - 0.4).abs() < f32::EPSILON);
                assert_eq!(config.strides, vec![8, 16]);
                assert_eq!(config.exp_mode, ExpMode::Fast);
                assert_eq!(
                    config.size_policy,
                    SizePolicy::StrideAligned {
                        size: 320,
                        stride: 32
                    }
                );
            }
            _ => panic!("expected decode"),
        }
    }

    #[test]
    fn test_descriptor_then_flags() {
        let descriptor = ModelDescriptor::from_yaml_str("style: dfl\nimgsz: 416").unwrap();
        let args = Cli::parse_from([
            "app", "decode", "-i", "a.jpg", "-o", "a.bin", "--shape", "1,2", "--conf", "0.6",
        ]);
        match args.command {
            Commands::Decode(decode) => {
                let config = decode.pipeline.to_config(Some(&descriptor));
                assert_eq!(config.style, DecodeStyle::dfl());
                assert_eq!(config.size_policy, SizePolicy::Fixed { size: 416 });
                assert!((config.prob_threshold - 0.6).abs() < f32::EPSILON);
            }
            _ => panic!("expected decode"),
        }
    }

    #[test]
    fn test_geometry_policy() {
        let args = Cli::parse_from(["app", "geometry", "--width", "1280", "--height", "720"]);
        match args.command {
            Commands::Geometry(geometry) => {
                assert_eq!(geometry.size_policy(), SizePolicy::Fixed { size: 640 });
            }
            _ => panic!("expected geometry"),
        }
    }
}
