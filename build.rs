extern crate bindgen;
extern crate cc;

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 交叉编译时 clang 需要目标工具链的 sysroot 才能找到 <linux/fb.h>
fn sysroot_of(compiler: &Path) -> Option<String> {
    let output = Command::new(compiler).arg("-print-sysroot").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let sysroot = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sysroot.is_empty()).then_some(sysroot)
}

/// 从 `cc -E -v` 的输出中提取系统头文件搜索路径
fn include_dirs_of(compiler: &Path) -> Vec<String> {
    let Ok(output) = Command::new(compiler)
        .args(["-E", "-Wp,-v", "-xc", "/dev/null"])
        .output()
    else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .skip_while(|line| !line.starts_with("#include <...> search starts here:"))
        .skip(1)
        .take_while(|line| !line.starts_with("End of search list."))
        .map(|line| line.trim().to_string())
        .collect()
}

fn main() {
    println!("cargo:rerun-if-changed=bindings.h");

    let mut builder = bindgen::Builder::default()
        .header("bindings.h")
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .use_core()
        .derive_default(true)
        .allowlist_type("fb_var_screeninfo")
        .allowlist_type("fb_fix_screeninfo")
        .allowlist_var("FBIOGET_VSCREENINFO")
        .allowlist_var("FBIOGET_FSCREENINFO");

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("linux") {
        let compiler = cc::Build::new().get_compiler();
        let compiler_path = compiler.path();
        println!("cargo:warning=Detected compiler: {:?}", compiler_path);

        match sysroot_of(compiler_path) {
            Some(sysroot) => {
                println!("cargo:warning=Found sysroot: {}", sysroot);
                builder = builder.clang_arg(format!("--sysroot={}", sysroot));
            }
            None => {
                for dir in include_dirs_of(compiler_path) {
                    println!("cargo:warning=Found include path: {}", dir);
                    builder = builder.clang_arg(format!("-I{}", dir));
                }
            }
        }
    }

    let bindings = builder
        .generate()
        .expect("Unable to generate <linux/fb.h> bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings");
}
