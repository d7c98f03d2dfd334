fn main() {
    attendscan_lib::run()
}
