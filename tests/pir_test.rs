use vpir::client::PirClient;
use vpir::database::BytesDb;
use vpir::server::PirServer;
use vpir::xof::Xof;

fn retrieve_all_blocks(db: BytesDb, num_servers: usize) {
    let info = db.info.clone();
    let expected: Vec<Vec<u8>> =
        (0..info.num_blocks()).map(|i| db.block(i).to_vec()).collect();
    let server = PirServer::new(db);
    let mut client = PirClient::new(Xof::stream(&[3u8; 16]), info);

    for (i, want) in expected.iter().enumerate() {
        let queries = client.query(i, num_servers).unwrap();
        let answers: Vec<Vec<u8>> =
            queries.iter().map(|q| server.answer(q).unwrap()).collect();
        assert_eq!(&client.reconstruct(&answers).unwrap(), want, "block {}", i);
    }
}

#[test]
fn test_classic_vector_every_block() {
    let mut xof = Xof::keyed(b"db key");
    let db = BytesDb::random(&mut xof, 1 << 16, 1, 256).unwrap();
    assert_eq!(db.info.num_rows, 1);
    assert_eq!(db.info.num_columns, 32);
    retrieve_all_blocks(db, 2);
}

#[test]
fn test_classic_matrix_every_block() {
    let mut xof = Xof::keyed(b"db key");
    let db = BytesDb::random(&mut xof, 1 << 16, 4, 64).unwrap();
    assert_eq!(db.info.num_rows, 4);
    assert_eq!(db.info.num_columns, 32);
    retrieve_all_blocks(db, 2);
}

#[test]
fn test_classic_three_servers() {
    let mut xof = Xof::keyed(b"db key");
    let db = BytesDb::random(&mut xof, 1 << 14, 1, 32).unwrap();
    retrieve_all_blocks(db, 3);
}

#[test]
fn test_classic_columns_not_multiple_of_eight() {
    // 9 columns exercise the bit-packed tail byte.
    let mut xof = Xof::keyed(b"db key");
    let mut entries = vec![0u8; 9 * 4];
    xof.read(&mut entries);
    let db = BytesDb::from_entries(vpir::Info::classic(1, 9, 4), entries).unwrap();
    retrieve_all_blocks(db, 2);
}
