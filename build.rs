use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（构建时间戳，用于 --version）
    EmitBuilder::builder()
        .all_build()
        .emit()
        .expect("Failed to generate build information");
}
