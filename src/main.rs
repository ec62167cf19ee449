fn main() {
    pipeline_mail_sync_lib::run()
}
