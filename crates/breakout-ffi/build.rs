fn main() {
    uniffi::generate_scaffolding("src/breakout.udl").unwrap();
}
