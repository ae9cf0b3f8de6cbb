// A request parameter is stripped of quotes, interpolated into SQL, and
// executed inside a connection callback. Quote stripping is bypassable, so
// the flow is still an injection.

fn car_information_exists(request: Request) -> bool {
    let car_id = request_param("carId").replace("'", "");
    let sql = format!("select count(*) from cars where id = '{}'", car_id);
    let count = with_connection(|conn| {
        let stmt = conn.prepare_statement(&sql);
        stmt.run()
    });
    count > 0
}
