// main.rs — 命令行入口：把编辑过的截图补丁投影回等矩形天空盒

mod camera;
mod capture;
mod i18n;
mod projector;
mod store;

use camera::{euler_rotation_deg, CameraParameters};
use capture::CapturedFrame;
use projector::Projector;
use store::LoadError;

use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::thread;

struct Args {
    skybox: Option<PathBuf>,
    patch: Option<PathBuf>,
    out: Option<PathBuf>,
    opacity: f32,
    vfov_deg: Option<f32>,
    aspect: Option<f32>,
    rot_deg: Option<[f32; 3]>,
    max_dim: u32,
    show_help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            skybox: None,
            patch: None,
            out: None,
            opacity: 1.0,
            vfov_deg: None,
            aspect: None,
            rot_deg: None,
            max_dim: store::MAX_TEXTURE_DIM,
            show_help: false,
        }
    }
}

enum Input {
    Skybox(Result<RgbaImage, LoadError>),
    Patch(Result<CapturedFrame, LoadError>),
}

fn main() {
    // i18n
    let lang = i18n::resolve_lang_from_args();
    i18n::init(lang);

    env_logger::init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            print_usage();
            std::process::exit(2);
        }
    };

    if args.show_help {
        print_usage();
        return;
    }

    let (Some(skybox_path), Some(patch_path)) = (args.skybox.clone(), args.patch.clone()) else {
        eprintln!("{}", i18n::tr("error.missing_input"));
        print_usage();
        std::process::exit(2);
    };

    // 两张输入图互不依赖，放到后台线程并行解码
    let (tx, rx) = channel();
    {
        let tx = tx.clone();
        let path = skybox_path.clone();
        thread::spawn(move || {
            println!(
                "{}",
                i18n::tr_with("log.loading_image_bg", &[("path", format!("{:?}", path))])
            );
            let _ = tx.send(Input::Skybox(store::load_image(&path)));
        });
    }
    {
        let path = patch_path.clone();
        thread::spawn(move || {
            println!(
                "{}",
                i18n::tr_with("log.loading_image_bg", &[("path", format!("{:?}", path))])
            );
            let _ = tx.send(Input::Patch(capture::load_frame(&path)));
        });
    }

    let mut skybox = None;
    let mut frame = None;
    for _ in 0..2 {
        match rx.recv() {
            Ok(Input::Skybox(r)) => skybox = Some(unwrap_or_exit(r, &skybox_path)),
            Ok(Input::Patch(r)) => frame = Some(unwrap_or_exit(r, &patch_path)),
            Err(_) => break,
        }
    }
    let (Some(skybox), Some(frame)) = (skybox, frame) else {
        // 只有解码线程异常退出才会走到这里
        eprintln!("{}", i18n::tr("error.load_worker_gone"));
        std::process::exit(1);
    };

    let (w, h) = skybox.dimensions();
    println!(
        "{}",
        i18n::tr_with(
            "log.image_loaded_size",
            &[("w", w.to_string()), ("h", h.to_string())]
        )
    );

    // 相机参数：命令行显式值 > sidecar / 文件名元数据
    let (pw, ph) = frame.image.dimensions();
    let Some(cam) = resolve_camera(&args, frame.camera, pw, ph) else {
        eprintln!(
            "{}",
            i18n::tr_with(
                "error.missing_camera",
                &[("path", format!("{:?}", patch_path))]
            )
        );
        std::process::exit(2);
    };
    log::info!(
        "camera: vfov {:.1} deg, aspect {:.3}",
        cam.vfov.to_degrees(),
        cam.aspect
    );
    log::debug!("canonical frame name: {}", capture::frame_file_name(&cam, pw, ph));

    let skybox = store::normalize_panorama(skybox, args.max_dim);

    let mut projector = Projector::new();
    projector.skybox = Some(skybox);
    projector.patch = Some(frame.image);
    projector.camera = Some(cam);
    projector.opacity = args.opacity;

    println!("{}", i18n::tr("log.projecting"));
    if let Err(e) = projector.project() {
        eprintln!(
            "{}",
            i18n::tr_with("error.project_failed", &[("err", e.to_string())])
        );
        std::process::exit(1);
    }
    println!("{}", i18n::tr("log.project_done"));

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| default_out_path(&skybox_path));
    let patched = projector.skybox.as_ref().unwrap();
    if let Err(e) = store::save_image(patched, &out) {
        eprintln!(
            "{}",
            i18n::tr_with("error.save_failed", &[("err", e.to_string())])
        );
        std::process::exit(1);
    }
    println!(
        "{}",
        i18n::tr_with("log.saved", &[("path", format!("{:?}", out))])
    );
}

fn unwrap_or_exit<T>(r: Result<T, LoadError>, path: &Path) -> T {
    match r {
        Ok(v) => v,
        Err(e) => {
            eprintln!(
                "{}",
                i18n::tr_with(
                    "error.load_failed",
                    &[("path", format!("{:?}", path)), ("err", e.to_string())]
                )
            );
            std::process::exit(1);
        }
    }
}

/// 相机参数的优先级合并：以帧元数据为底，命令行逐项覆盖；
/// 没有任何元数据时至少需要 --vfov，宽高比兜底为 patch 自身的宽高比。
fn resolve_camera(
    args: &Args,
    from_frame: Option<CameraParameters>,
    patch_w: u32,
    patch_h: u32,
) -> Option<CameraParameters> {
    let default_aspect = patch_w as f32 / patch_h as f32;

    match from_frame {
        Some(mut cam) => {
            if let Some(v) = args.vfov_deg {
                cam.vfov = v.to_radians();
            }
            if let Some(a) = args.aspect {
                cam.aspect = a;
            }
            if let Some([ex, ey, ez]) = args.rot_deg {
                cam.orientation = euler_rotation_deg(ex, ey, ez);
            }
            Some(cam)
        }
        None => {
            let vfov_deg = args.vfov_deg?;
            let [ex, ey, ez] = args.rot_deg.unwrap_or([0.0; 3]);
            Some(CameraParameters::new(
                vfov_deg.to_radians(),
                args.aspect.unwrap_or(default_aspect),
                euler_rotation_deg(ex, ey, ez),
            ))
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(a) = it.next() {
        match a.as_str() {
            "--skybox" => args.skybox = Some(PathBuf::from(next_value(&mut it, "--skybox")?)),
            "--patch" => args.patch = Some(PathBuf::from(next_value(&mut it, "--patch")?)),
            "--out" => args.out = Some(PathBuf::from(next_value(&mut it, "--out")?)),
            "--opacity" => args.opacity = next_number(&mut it, "--opacity")?,
            "--vfov" => args.vfov_deg = Some(next_number(&mut it, "--vfov")?),
            "--aspect" => args.aspect = Some(next_number(&mut it, "--aspect")?),
            "--rot" => args.rot_deg = Some(parse_rot(&next_value(&mut it, "--rot")?)?),
            "--max-dim" => args.max_dim = next_number(&mut it, "--max-dim")?,
            // 语言选择已在 i18n::resolve_lang_from_args 中提前处理
            "--lang" => {
                let _ = it.next();
            }
            "--help" | "-h" => args.show_help = true,
            other => {
                return Err(i18n::tr_with(
                    "cli.unknown_flag",
                    &[("flag", other.to_string())],
                ))
            }
        }
    }

    Ok(args)
}

fn next_value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    it.next()
        .ok_or_else(|| i18n::tr_with("cli.missing_value", &[("flag", flag.to_string())]))
}

fn next_number<T: std::str::FromStr>(
    it: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    next_value(it, flag)?
        .parse()
        .map_err(|_| i18n::tr_with("cli.bad_number", &[("flag", flag.to_string())]))
}

/// "--rot x,y,z"（度）
fn parse_rot(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(i18n::tr_with("cli.bad_rot", &[("value", s.to_string())]));
    }

    let mut out = [0.0f32; 3];
    for (dst, p) in out.iter_mut().zip(parts) {
        *dst = p
            .trim()
            .parse()
            .map_err(|_| i18n::tr_with("cli.bad_rot", &[("value", s.to_string())]))?;
    }
    Ok(out)
}

fn default_out_path(skybox: &Path) -> PathBuf {
    let stem = skybox
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("skybox");
    skybox.with_file_name(format!("{stem}_patched.png"))
}

fn print_usage() {
    println!("{}", i18n::tr("cli.usage"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rot_parses_three_components() {
        assert_eq!(parse_rot("10, -20,30.5").unwrap(), [10.0, -20.0, 30.5]);
        assert!(parse_rot("10,20").is_err());
        assert!(parse_rot("a,b,c").is_err());
    }

    #[test]
    fn default_out_sits_next_to_the_skybox() {
        let out = default_out_path(Path::new("/tmp/sky/pano.jpg"));
        assert_eq!(out, PathBuf::from("/tmp/sky/pano_patched.png"));
    }

    #[test]
    fn explicit_flags_override_frame_metadata() {
        let args = Args {
            vfov_deg: Some(45.0),
            ..Args::default()
        };
        let meta = CameraParameters::from_euler_deg(0.0, 90.0, 0.0, 70.0, 16.0 / 9.0);
        let cam = resolve_camera(&args, Some(meta), 1920, 1080).unwrap();
        assert!((cam.vfov.to_degrees() - 45.0).abs() < 1e-4);
        // 未覆盖的分量保持元数据值
        assert!((cam.aspect - 16.0 / 9.0).abs() < 1e-5);
    }

    #[test]
    fn camera_without_metadata_requires_vfov() {
        let args = Args::default();
        assert!(resolve_camera(&args, None, 100, 50).is_none());

        let args = Args {
            vfov_deg: Some(60.0),
            ..Args::default()
        };
        let cam = resolve_camera(&args, None, 100, 50).unwrap();
        // 宽高比兜底为 patch 自身的宽高比
        assert!((cam.aspect - 2.0).abs() < 1e-6);
    }
}
